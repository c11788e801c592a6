//! Shared fixtures for protocol integration tests.

#![allow(dead_code)]

use rollcall_protocol::{CardPayload, ReaderMessage};

pub const STUDENT_1: &str = "S2024001";
pub const STUDENT_2: &str = "S2024002";

/// Card message with fixed names and all dates present.
pub fn card(student_number: &str) -> ReaderMessage {
    let mut payload = CardPayload::new(student_number, "山田太郎", "ヤマダタロウ");
    payload.birthday = Some("2003/04/01".to_string());
    payload.publication_date = Some("2021/04/01".to_string());
    payload.expiry_date = Some("2025/03/31".to_string());
    ReaderMessage::Card(payload)
}

/// Raw JSON for a card message, as the reader process writes it.
pub fn card_json(student_number: &str) -> String {
    format!(
        r#"{{"type":"card","student_number":"{student_number}","name_kanji":"山田太郎","name_kana":"ヤマダタロウ"}}"#
    )
}

pub fn released() -> ReaderMessage {
    ReaderMessage::Released
}

/// Assert that `message` is a card for `student_number`.
pub fn assert_card(message: &ReaderMessage, student_number: &str) {
    match message {
        ReaderMessage::Card(payload) => assert_eq!(payload.student_number, student_number),
        other => panic!("expected card for {student_number}, got {other:?}"),
    }
}
