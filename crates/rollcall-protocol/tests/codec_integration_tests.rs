//! ReaderCodec over real Tokio streams.

mod common;

use futures::{SinkExt, StreamExt};
use rollcall_protocol::{ParseError, ReaderCodec, ReaderMessage};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio_util::codec::{Framed, FramedRead};

fn create_framed_duplex(
    buffer_size: usize,
) -> (
    Framed<DuplexStream, ReaderCodec>,
    Framed<DuplexStream, ReaderCodec>,
) {
    let (client, server) = tokio::io::duplex(buffer_size);
    (
        Framed::new(client, ReaderCodec::new()),
        Framed::new(server, ReaderCodec::new()),
    )
}

#[tokio::test]
async fn test_codec_roundtrip_card() {
    let (mut client, mut server) = create_framed_duplex(1024);

    client.send(common::card(common::STUDENT_1)).await.unwrap();

    let received = server.next().await.unwrap().unwrap().unwrap();
    assert_eq!(received, common::card(common::STUDENT_1));
}

#[tokio::test]
async fn test_codec_messages_in_sequence() {
    let (mut client, mut server) = create_framed_duplex(1024);

    client.send(common::card(common::STUDENT_1)).await.unwrap();
    client.send(common::released()).await.unwrap();
    client.send(common::card(common::STUDENT_2)).await.unwrap();

    let first = server.next().await.unwrap().unwrap().unwrap();
    common::assert_card(&first, common::STUDENT_1);
    assert_eq!(
        server.next().await.unwrap().unwrap().unwrap(),
        ReaderMessage::Released
    );
    let third = server.next().await.unwrap().unwrap().unwrap();
    common::assert_card(&third, common::STUDENT_2);
}

#[tokio::test]
async fn test_codec_with_small_buffer() {
    // An 8-byte pipe forces every object through many partial reads.
    let (mut client, mut server) = create_framed_duplex(8);

    let send = tokio::spawn(async move {
        client.send(common::card(common::STUDENT_1)).await.unwrap();
        client
    });

    let received = server.next().await.unwrap().unwrap().unwrap();
    common::assert_card(&received, common::STUDENT_1);
    let _client = send.await.unwrap();
}

#[tokio::test]
async fn test_concatenated_objects_without_newlines() {
    let (mut writer, reader) = tokio::io::duplex(1024);
    let mut frames = FramedRead::new(reader, ReaderCodec::new());

    let raw = format!(
        "{}{}",
        common::card_json(common::STUDENT_1),
        common::card_json(common::STUDENT_2)
    );
    writer.write_all(raw.as_bytes()).await.unwrap();
    drop(writer);

    let first = frames.next().await.unwrap().unwrap().unwrap();
    common::assert_card(&first, common::STUDENT_1);
    let second = frames.next().await.unwrap().unwrap().unwrap();
    common::assert_card(&second, common::STUDENT_2);
    assert!(frames.next().await.is_none());
}

#[tokio::test]
async fn test_malformed_message_keeps_connection_open() {
    let (mut writer, reader) = tokio::io::duplex(1024);
    let mut frames = FramedRead::new(reader, ReaderCodec::new());

    writer.write_all(b"{\"type\":\"card\",,}\n").await.unwrap();
    writer
        .write_all(common::card_json(common::STUDENT_1).as_bytes())
        .await
        .unwrap();
    drop(writer);

    let bad = frames.next().await.unwrap().unwrap();
    assert!(matches!(bad, Err(ParseError::Malformed(_))));

    let good = frames.next().await.unwrap().unwrap().unwrap();
    common::assert_card(&good, common::STUDENT_1);
}

#[tokio::test]
async fn test_oversized_object_is_dropped_and_stream_resyncs() {
    let (mut writer, reader) = tokio::io::duplex(4096);
    let mut frames = FramedRead::new(reader, ReaderCodec::with_max_frame_size(128));

    let big = format!(r#"{{"type":"info","message":"{}"}}"#, "x".repeat(512));
    writer.write_all(big.as_bytes()).await.unwrap();
    writer.write_all(b"\n{\"type\":\"released\"}\n").await.unwrap();
    drop(writer);

    let mut saw_overflow = false;
    let mut saw_released = false;
    while let Some(item) = frames.next().await {
        match item.unwrap() {
            Err(ParseError::FrameTooLarge { max_size, .. }) => {
                assert_eq!(max_size, 128);
                saw_overflow = true;
            }
            Ok(ReaderMessage::Released) => saw_released = true,
            _ => {}
        }
    }

    assert!(saw_overflow);
    assert!(saw_released);
}

#[tokio::test]
async fn test_stream_ends_cleanly_on_partial_trailing_object() {
    let (mut writer, reader) = tokio::io::duplex(1024);
    let mut frames = FramedRead::new(reader, ReaderCodec::new());

    writer.write_all(br#"{"type":"rele"#).await.unwrap();
    drop(writer);

    assert!(frames.next().await.is_none());
}
