#![expect(clippy::unwrap_used, reason = "test code can panic on errors")]

use bytes::{Bytes, BytesMut};
use mux_proto::*;

fn check_encode_decode(sample_msg: Message, raw_msg: &[u8]) {
    let mut encoded = BytesMut::new();
    sample_msg.encode(&mut encoded).unwrap();
    assert_eq!(raw_msg.to_vec(), encoded.to_vec());

    let decoded = Message::decode(Bytes::copy_from_slice(raw_msg)).unwrap();
    assert_eq!(sample_msg, decoded);
}

#[test]
fn kind_try_from() {
    let kind = Kind::try_from(0).unwrap();
    assert_eq!(Kind::Open, kind);

    let kind = Kind::try_from(2).unwrap();
    assert_eq!(Kind::Window, kind);

    let kind = Kind::try_from(3).unwrap();
    assert_eq!(Kind::Close, kind);

    let kind = Kind::try_from(4).unwrap();
    assert_eq!(Kind::Reset, kind);
}

#[test]
fn kind_try_err_on_invalid_bytes() {
    assert!(Kind::try_from(5).is_err());
    assert!(Kind::try_from(255).is_err());
}

#[test]
fn header_decode_buffer_too_short_err() {
    let err = Header::decode(Bytes::from_static(&[])).err().unwrap();
    assert_eq!(
        "not enough bytes provided to decode HEADER: received 0 bytes, expected 8 bytes",
        err.to_string()
    );
}

#[test]
fn header_decode() {
    let msg = Header::decode(Bytes::from_static(&[1, 0, 0, 0, 4, 1, 0, 0])).unwrap();
    assert_eq!(
        Header {
            stream_id: 1,
            kind: Kind::Reset,
            length: 1,
        },
        msg
    );
}

#[test]
fn header_encode() {
    let header = Header {
        stream_id: 7,
        kind: Kind::Data,
        length: 4,
    };
    let mut buf = BytesMut::new();
    header.encode(&mut buf);
    assert_eq!(vec![7, 0, 0, 0, 1, 4, 0, 0], buf);
}

#[test]
fn channel_open() {
    let raw_msg = &[
        1, 0, 0, 0, // stream id
        0, // kind: open
        0, 0, 0, // length: 0
    ];

    let msg_sample = ChannelOpen::new(StreamId::from(1));

    check_encode_decode(Message::Open(msg_sample), raw_msg);
}

#[test]
fn open_with_payload_is_rejected() {
    let raw_msg = &[
        1, 0, 0, 0, // stream id
        0, // kind: open
        1, 0, 0, // length: 1 (invalid, OPEN carries no payload)
        0xff,
    ];

    let err = Message::decode(Bytes::copy_from_slice(raw_msg)).err().unwrap();
    assert_eq!("invalid `length` in OPEN: OPEN carries no payload", err.to_string());
}

#[test]
fn channel_window() {
    let raw_msg = &[
        1, 0, 0, 0, // stream id
        2, // kind: window
        4, 0, 0, // length
        0, 2, 0, 0, // delta: 512
    ];

    let msg_example = Message::window(StreamId::from(1), 512);

    check_encode_decode(msg_example, raw_msg);
}

#[test]
fn error_on_oversized_packet() {
    let mut buf = BytesMut::new();
    let oversized = vec![0; Header::MAX_LENGTH as usize + 1];
    let err = Message::data(StreamId::from(1), oversized.into())
        .encode(&mut buf)
        .err()
        .unwrap();
    assert_eq!(
        format!("packet oversized: max is {}, got {}", Header::MAX_LENGTH, Header::MAX_LENGTH + 1),
        err.to_string()
    );
}

#[test]
fn channel_data() {
    let raw_msg = &[
        1, 0, 0, 0, // stream id
        1, // kind: data
        4, 0, 0, // length
        11, 12, 13, 14, // payload
    ];

    let msg_example = Message::data(StreamId::from(1), vec![11, 12, 13, 14].into());

    check_encode_decode(msg_example, raw_msg);
}

#[test]
fn channel_close() {
    let raw_msg = &[
        1, 0, 0, 0, // stream id
        3, // kind: close
        0, 0, 0, // length
    ];

    let msg_example = Message::close(StreamId::from(1));

    check_encode_decode(msg_example, raw_msg);
}

#[test]
fn close_with_payload_is_rejected() {
    let raw_msg = &[1, 0, 0, 0, 3, 1, 0, 0, 0xff];
    let err = Message::decode(Bytes::copy_from_slice(raw_msg)).err().unwrap();
    assert_eq!("invalid `length` in CLOSE: CLOSE carries no payload", err.to_string());
}

#[test]
fn channel_reset() {
    let raw_msg = &[
        1, 0, 0, 0, // stream id
        4, // kind: reset
        1, 0, 0, // length
        2, // reason: protocol violation
    ];

    let msg_example = Message::reset(StreamId::from(1), ResetReason::ProtocolViolation);

    check_encode_decode(msg_example, raw_msg);
}

#[test]
fn channel_reset_unknown_reason_decodes_as_other() {
    let raw_msg = &[
        3, 0, 0, 0, // stream id
        4, // kind: reset
        1, 0, 0, // length
        250, // reason: not a known variant
    ];

    let decoded = Message::decode(Bytes::copy_from_slice(raw_msg)).unwrap();
    match decoded {
        Message::Reset(reset) => {
            assert_eq!(3, reset.stream_id);
            assert_eq!(ResetReason::Other, reset.reason);
        }
        other => panic!("unexpected message: {other:?}"),
    }
}
