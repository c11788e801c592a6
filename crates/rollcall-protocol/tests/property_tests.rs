//! Property-based tests for the reader codec.
//!
//! Object boundaries must not depend on how TCP happens to chunk the stream.

use bytes::BytesMut;
use proptest::prelude::*;
use rollcall_protocol::{CardPayload, ReaderCodec, ReaderMessage};
use tokio_util::codec::{Decoder, Encoder};

fn valid_student_number() -> impl Strategy<Value = String> {
    "[A-Z0-9]{1,32}"
}

fn name() -> impl Strategy<Value = String> {
    // Includes braces and quotes to exercise string tracking.
    "[a-zA-Z {}\\[\\]\"\\\\]{0,24}"
}

fn message() -> impl Strategy<Value = ReaderMessage> {
    prop_oneof![
        (valid_student_number(), name(), name())
            .prop_map(|(sn, full, short)| ReaderMessage::Card(CardPayload::new(sn, full, short))),
        name().prop_map(|message| ReaderMessage::Info { message }),
        name().prop_map(|message| ReaderMessage::Error { message }),
        Just(ReaderMessage::Released),
    ]
}

fn decode_in_chunks(bytes: &[u8], chunk: usize) -> Vec<ReaderMessage> {
    let mut codec = ReaderCodec::new();
    let mut out = Vec::new();
    let mut buffer = BytesMut::new();

    for piece in bytes.chunks(chunk) {
        buffer.extend_from_slice(piece);
        while let Some(decoded) = codec.decode(&mut buffer).unwrap() {
            out.push(decoded.unwrap());
        }
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_chunking_does_not_change_decoded_messages(
        messages in prop::collection::vec(message(), 1..8),
        chunk in 1usize..64,
    ) {
        let mut codec = ReaderCodec::new();
        let mut wire = BytesMut::new();
        for m in &messages {
            codec.encode(m.clone(), &mut wire).unwrap();
        }

        let decoded = decode_in_chunks(&wire, chunk);
        prop_assert_eq!(decoded, messages);
    }

    #[test]
    fn prop_leading_garbage_is_skipped(
        garbage in "[a-z ]{0,32}",
        sn in valid_student_number(),
    ) {
        let msg = ReaderMessage::Card(CardPayload::new(sn, "a", "b"));
        let mut codec = ReaderCodec::new();
        let mut wire = BytesMut::from(garbage.as_bytes());
        codec.encode(msg.clone(), &mut wire).unwrap();

        let decoded = decode_in_chunks(&wire, 7);
        prop_assert_eq!(decoded, vec![msg]);
    }
}
