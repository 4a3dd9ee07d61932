use std::io;

use bytes::BytesMut;
use mux_proto::{Header, Message};
use tokio_util::codec::{Decoder, Encoder};

/// Largest DATA chunk written to a single frame. Fixed rather than negotiated: OPEN carries
/// no payload, so both ends must already agree on this value before a stream exists.
pub(crate) const MAXIMUM_PACKET_SIZE_IN_BYTES: usize = 16 * 1024;

/// Send window every newly-opened stream starts with, topped up via WINDOW frames as data
/// is consumed. Fixed for the same reason as `MAXIMUM_PACKET_SIZE_IN_BYTES`.
pub(crate) const INITIAL_WINDOW_SIZE: u32 = 64 * 1024 * 1024;

pub(crate) struct MuxCodec;

impl Decoder for MuxCodec {
    type Item = Message;

    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        const MAX_RESERVE_CHUNK_IN_BYTES: usize = 8 * 1024; // 8 kiB

        if src.len() < Header::SIZE {
            // Not enough data to read the header.
            return Ok(None);
        }

        // Read the payload length out of the header without consuming it yet.
        let mut length_bytes = [0u8; 4];
        length_bytes[..3].copy_from_slice(&src[5..8]);
        let payload_len = u32::from_le_bytes(length_bytes) as usize;
        let frame_len = Header::SIZE + payload_len;

        if src.len() < frame_len {
            // The full frame has not arrived yet.
            // Reserve more space in the buffer (good performance-wise).
            let additional = core::cmp::min(MAX_RESERVE_CHUNK_IN_BYTES, frame_len - src.len());
            src.reserve(additional);

            // Inform the Framed that more bytes are required to form the next frame.
            return Ok(None);
        }

        // `split_to` is modifying src such that it no longer contains this frame (`advance` could have been used as well)
        let frame_bytes = src.split_to(frame_len).freeze();

        // Parse the multiplexer frame contained in this slice
        let message = Message::decode(frame_bytes).map_err(io::Error::other)?;

        Ok(Some(message))
    }
}

impl Encoder<Message> for MuxCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode(dst).map_err(io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test code can panic on errors")]

    use super::*;
    use bytes::Bytes;
    use futures_util::StreamExt;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, ReadBuf};
    use tokio_util::codec::FramedRead;

    struct MockAsyncReader {
        raw_msg: Vec<u8>,
    }

    impl AsyncRead for MockAsyncReader {
        fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            if buf.remaining() > 0 {
                let amount = std::cmp::min(buf.remaining(), self.raw_msg.len());
                buf.put_slice(&self.raw_msg[0..amount]);
                self.raw_msg.drain(0..amount);
                Poll::Ready(Ok(()))
            } else {
                Poll::Pending
            }
        }
    }

    #[tokio::test]
    async fn mux_decoder() {
        let raw_msg = &[
            1, 0, 0, 0, // stream id
            1, // kind: data
            4, 0, 0, // length
            11, 12, 13, 14, // payload
        ];

        let expected_message = Message::decode(Bytes::from_static(raw_msg)).unwrap();

        let reader = MockAsyncReader {
            raw_msg: raw_msg.to_vec(),
        };
        let mut framed_reader = FramedRead::new(reader, MuxCodec);
        let frame = framed_reader.next().await.unwrap().unwrap();

        assert_eq!(expected_message, frame);
    }
}
