//! Wire messages for the stream multiplexer: a little-endian fixed header (stream id, kind,
//! payload length) followed by a kind-dependent payload. Stream identifiers are shared between
//! both ends: whichever side opens a stream picks the id, and the peer addresses the same
//! stream using that same numeric value, so there is no per-endpoint translation.

use core::fmt;

use bytes::{Buf as _, BufMut as _};

// We re-export these types, because they are used in the public API.
#[rustfmt::skip]
pub use bytes::{Bytes, BytesMut};

/// Identifier for a multiplexed stream, assigned by whichever side sends `Open`.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct StreamId(u32);

impl From<u32> for StreamId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl From<StreamId> for u32 {
    fn from(id: StreamId) -> Self {
        id.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    PacketOversized {
        packet_size: usize,
        max: usize,
    },
    NotEnoughBytes {
        name: &'static str,
        received: usize,
        expected: usize,
    },
    InvalidPacket {
        name: &'static str,
        field: &'static str,
        reason: &'static str,
    },
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PacketOversized { packet_size, max } => {
                write!(f, "packet oversized: max is {max}, got {packet_size}")
            }
            Error::NotEnoughBytes {
                name,
                received,
                expected,
            } => write!(
                f,
                "not enough bytes provided to decode {name}: received {received} bytes, expected {expected} bytes"
            ),
            Error::InvalidPacket { name, field, reason } => {
                write!(f, "invalid `{field}` in {name}: {reason}")
            }
        }
    }
}

macro_rules! ensure_size {
    ($buf:ident [$expected:expr] for $name:expr) => {{
        let received = $buf.len();
        let expected = $expected;
        if !(received >= expected) {
            return Err(Error::NotEnoughBytes {
                name: $name,
                received,
                expected,
            });
        }
    }};
    (plain $packet_struct:ident in $buf:ident) => {{
        ensure_size!($buf[$packet_struct::SIZE] for $packet_struct::NAME)
    }};
}

#[derive(Debug, PartialEq, Eq)]
pub enum Message {
    Open(ChannelOpen),
    Data(ChannelData),
    Window(ChannelWindow),
    Close(ChannelClose),
    Reset(ChannelReset),
}

impl Message {
    pub fn open(id: StreamId) -> Self {
        Self::Open(ChannelOpen::new(id))
    }

    pub fn data(id: StreamId, payload: Bytes) -> Self {
        Self::Data(ChannelData::new(id, payload))
    }

    pub fn window(id: StreamId, delta: u32) -> Self {
        Self::Window(ChannelWindow::new(id, delta))
    }

    pub fn close(id: StreamId) -> Self {
        Self::Close(ChannelClose::new(id))
    }

    pub fn reset(id: StreamId, reason: ResetReason) -> Self {
        Self::Reset(ChannelReset::new(id, reason))
    }

    pub fn stream_id(&self) -> StreamId {
        let raw = match self {
            Message::Open(msg) => msg.stream_id,
            Message::Data(msg) => msg.stream_id,
            Message::Window(msg) => msg.stream_id,
            Message::Close(msg) => msg.stream_id,
            Message::Reset(msg) => msg.stream_id,
        };
        StreamId::from(raw)
    }

    fn kind(&self) -> Kind {
        match self {
            Message::Open(_) => Kind::Open,
            Message::Data(_) => Kind::Data,
            Message::Window(_) => Kind::Window,
            Message::Close(_) => Kind::Close,
            Message::Reset(_) => Kind::Reset,
        }
    }

    fn payload_size(&self) -> usize {
        match self {
            Message::Open(_) | Message::Close(_) => 0,
            Message::Data(msg) => msg.size(),
            Message::Window(_) => ChannelWindow::PAYLOAD_SIZE,
            Message::Reset(_) => ChannelReset::PAYLOAD_SIZE,
        }
    }

    pub fn size(&self) -> usize {
        Header::SIZE + self.payload_size()
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), Error> {
        let payload_size = self.payload_size();

        if payload_size > Header::MAX_LENGTH as usize {
            return Err(Error::PacketOversized {
                packet_size: payload_size,
                max: Header::MAX_LENGTH as usize,
            });
        }

        let total_size = Header::SIZE + payload_size;
        if buf.capacity().saturating_sub(buf.len()) < total_size {
            buf.reserve(total_size - buf.len());
        }

        let header = Header {
            stream_id: u32::from(self.stream_id()),
            kind: self.kind(),
            length: payload_size as u32,
        };
        header.encode(buf);

        match self {
            Message::Open(msg) => msg.encode(buf),
            Message::Data(msg) => msg.encode(buf),
            Message::Window(msg) => msg.encode(buf),
            Message::Close(msg) => msg.encode(buf),
            Message::Reset(msg) => msg.encode(buf),
        }

        Ok(())
    }

    pub fn decode(mut buf: Bytes) -> Result<Self, Error> {
        ensure_size!(plain Header in buf);

        let header = Header::decode(buf.split_to(Header::SIZE))?;
        let payload_size = header.length as usize;

        ensure_size!(buf[payload_size] for "PAYLOAD");
        let payload = buf.split_to(payload_size);

        let message = match header.kind {
            Kind::Open => Self::Open(ChannelOpen::decode(header.stream_id, payload)?),
            Kind::Data => Self::Data(ChannelData::decode(header.stream_id, payload)?),
            Kind::Window => Self::Window(ChannelWindow::decode(header.stream_id, payload)?),
            Kind::Close => Self::Close(ChannelClose::decode(header.stream_id, payload)?),
            Kind::Reset => Self::Reset(ChannelReset::decode(header.stream_id, payload)?),
        };

        Ok(message)
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Open = 0,
    Data = 1,
    Window = 2,
    Close = 3,
    Reset = 4,
}

impl TryFrom<u8> for Kind {
    type Error = Error;

    fn try_from(v: u8) -> Result<Kind, Error> {
        match v {
            0 => Ok(Kind::Open),
            1 => Ok(Kind::Data),
            2 => Ok(Kind::Window),
            3 => Ok(Kind::Close),
            4 => Ok(Kind::Reset),
            _ => Err(Error::InvalidPacket {
                name: Header::NAME,
                field: "kind",
                reason: "unknown value",
            }),
        }
    }
}

/// Fixed frame header: 4-byte stream id, 1-byte kind, 3-byte payload length, all little-endian.
#[derive(Debug, PartialEq, Eq)]
pub struct Header {
    pub stream_id: u32,
    pub kind: Kind,
    pub length: u32,
}

impl Header {
    pub const NAME: &'static str = "HEADER";
    pub const SIZE: usize = 4 /* streamId */ + 1 /* kind */ + 3 /* length */;
    pub const MAX_LENGTH: u32 = (1 << 24) - 1;

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.stream_id);
        buf.put_u8(self.kind as u8);
        buf.put_uint_le(u64::from(self.length), 3);
    }

    pub fn decode(mut buf: Bytes) -> Result<Self, Error> {
        ensure_size!(plain Self in buf);
        Ok(Self {
            stream_id: buf.get_u32_le(),
            kind: Kind::try_from(buf.get_u8())?,
            length: buf.get_uint_le(3) as u32,
        })
    }
}

/// Opens a stream. Carries no payload; the destination is negotiated afterwards by the
/// endpoints themselves, over the stream's data bytes.
#[derive(Debug, PartialEq, Eq)]
pub struct ChannelOpen {
    pub stream_id: u32,
}

impl ChannelOpen {
    pub const NAME: &'static str = "OPEN";

    pub fn new(id: StreamId) -> Self {
        Self { stream_id: u32::from(id) }
    }

    pub fn encode(&self, _buf: &mut BytesMut) {}

    pub fn decode(stream_id: u32, buf: Bytes) -> Result<Self, Error> {
        if !buf.is_empty() {
            return Err(Error::InvalidPacket {
                name: Self::NAME,
                field: "length",
                reason: "OPEN carries no payload",
            });
        }
        Ok(Self { stream_id })
    }
}

#[derive(PartialEq, Eq)]
pub struct ChannelData {
    pub stream_id: u32,
    pub payload: Bytes,
}

// We don't want to print `payload` content (usually too big)
impl fmt::Debug for ChannelData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelData")
            .field("stream_id", &self.stream_id)
            .field("payload.len()", &self.payload.len())
            .finish_non_exhaustive()
    }
}

impl ChannelData {
    pub const NAME: &'static str = "DATA";

    pub fn new(id: StreamId, payload: Bytes) -> Self {
        Self {
            stream_id: u32::from(id),
            payload,
        }
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put(self.payload.slice(..));
    }

    pub fn decode(stream_id: u32, buf: Bytes) -> Result<Self, Error> {
        Ok(Self { stream_id, payload: buf })
    }
}

/// Grants the peer additional send window for a stream.
#[derive(Debug, PartialEq, Eq)]
pub struct ChannelWindow {
    pub stream_id: u32,
    pub delta: u32,
}

impl ChannelWindow {
    pub const NAME: &'static str = "WINDOW";
    pub const PAYLOAD_SIZE: usize = 4;

    pub fn new(id: StreamId, delta: u32) -> Self {
        Self {
            stream_id: u32::from(id),
            delta,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.delta);
    }

    pub fn decode(stream_id: u32, mut buf: Bytes) -> Result<Self, Error> {
        ensure_size!(buf[Self::PAYLOAD_SIZE] for Self::NAME);
        Ok(Self {
            stream_id,
            delta: buf.get_u32_le(),
        })
    }
}

/// Half-closes one direction of a stream. The stream transitions out of use once both ends
/// have sent `Close`.
#[derive(Debug, PartialEq, Eq)]
pub struct ChannelClose {
    pub stream_id: u32,
}

impl ChannelClose {
    pub const NAME: &'static str = "CLOSE";

    pub fn new(id: StreamId) -> Self {
        Self { stream_id: u32::from(id) }
    }

    pub fn encode(&self, _buf: &mut BytesMut) {}

    pub fn decode(stream_id: u32, buf: Bytes) -> Result<Self, Error> {
        if !buf.is_empty() {
            return Err(Error::InvalidPacket {
                name: Self::NAME,
                field: "length",
                reason: "CLOSE carries no payload",
            });
        }
        Ok(Self { stream_id })
    }
}

/// Reason a stream was forcibly reset rather than closed gracefully.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    /// Peer-side transport failed and the stream cannot be drained.
    TransportFailure = 0,
    /// Local stream id was reclaimed before its peer acknowledged closure.
    Reclaimed = 1,
    /// Flow-control violation (peer exceeded its advertised window).
    ProtocolViolation = 2,
    /// Any other reason not covered above.
    Other = 255,
}

impl ResetReason {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::TransportFailure,
            1 => Self::Reclaimed,
            2 => Self::ProtocolViolation,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for ResetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportFailure => write!(f, "transport failure"),
            Self::Reclaimed => write!(f, "stream id reclaimed"),
            Self::ProtocolViolation => write!(f, "protocol violation"),
            Self::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ChannelReset {
    pub stream_id: u32,
    pub reason: ResetReason,
}

impl ChannelReset {
    pub const NAME: &'static str = "RESET";
    pub const PAYLOAD_SIZE: usize = 1;

    pub fn new(id: StreamId, reason: ResetReason) -> Self {
        Self {
            stream_id: u32::from(id),
            reason,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.reason as u8);
    }

    pub fn decode(stream_id: u32, mut buf: Bytes) -> Result<Self, Error> {
        ensure_size!(buf[Self::PAYLOAD_SIZE] for Self::NAME);
        Ok(Self {
            stream_id,
            reason: ResetReason::from_u8(buf.get_u8()),
        })
    }
}
