//! Messages sent by the reader process.
//!
//! Every message is a JSON object tagged by its `type` field:
//!
//! ```text
//! {"type":"card","student_number":"S001","name_kanji":"山田太郎","name_kana":"ヤマダタロウ",
//!  "birthday":"2003/04/01","publication_date":"2021/04/01","expiry_date":"2025/03/31"}
//! {"type":"error","message":"NFC READER NOT FOUND"}
//! {"type":"info","message":"NFC READER CONNECTED"}
//! {"type":"released"}
//! ```
//!
//! Any other `type` decodes to [`ReaderMessage::Unknown`] and is ignored by
//! the transport. Objects that are not valid JSON, or that are missing the
//! required card fields, decode to a [`ParseError`].

use rollcall_core::{ReadEvent, StudentNumber};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-message decode failure.
///
/// These never close the connection; the offending message is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Malformed reader message: {0}")]
    Malformed(String),

    #[error("Reader message too large: {size} bytes (max {max_size})")]
    FrameTooLarge { size: usize, max_size: usize },

    #[error("Invalid card data: {0}")]
    InvalidCard(String),
}

/// Card fields as written by the reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPayload {
    pub student_number: String,
    pub name_kanji: String,
    pub name_kana: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthday: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
}

impl CardPayload {
    pub fn new(
        student_number: impl Into<String>,
        name_kanji: impl Into<String>,
        name_kana: impl Into<String>,
    ) -> Self {
        Self {
            student_number: student_number.into(),
            name_kanji: name_kanji.into(),
            name_kana: name_kana.into(),
            birthday: None,
            publication_date: None,
            expiry_date: None,
        }
    }

    /// Validate the payload into a session read.
    ///
    /// # Errors
    /// Returns `ParseError::InvalidCard` if the student number is empty or
    /// not printable ASCII.
    pub fn into_read_event(self) -> Result<ReadEvent, ParseError> {
        let student_number = StudentNumber::new(&self.student_number)
            .map_err(|e| ParseError::InvalidCard(e.to_string()))?;

        Ok(ReadEvent {
            student_number,
            name_full: self.name_kanji.trim().to_string(),
            name_short: self.name_kana.trim().to_string(),
            birthday: non_blank(self.birthday),
            publication_date: non_blank(self.publication_date),
            expiry_date: non_blank(self.expiry_date),
        })
    }
}

impl From<&ReadEvent> for CardPayload {
    fn from(event: &ReadEvent) -> Self {
        Self {
            student_number: event.student_number.to_string(),
            name_kanji: event.name_full.clone(),
            name_kana: event.name_short.clone(),
            birthday: event.birthday.clone(),
            publication_date: event.publication_date.clone(),
            expiry_date: event.expiry_date.clone(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// One message from the reader process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReaderMessage {
    /// A card was read.
    Card(CardPayload),

    /// The reader reported a fault (reader missing, unsupported tag, ...).
    Error {
        #[serde(default)]
        message: String,
    },

    /// Informational notice, such as the reader coming online.
    Info {
        #[serde(default)]
        message: String,
    },

    /// The card left the reader field.
    Released,

    /// Any other `type` value.
    #[serde(other)]
    Unknown,
}

impl ReaderMessage {
    /// Parse one complete JSON object.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ParseError> {
        serde_json::from_slice(bytes).map_err(|e| ParseError::Malformed(e.to_string()))
    }

    /// Short name of the message type, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ReaderMessage::Card(_) => "card",
            ReaderMessage::Error { .. } => "error",
            ReaderMessage::Info { .. } => "info",
            ReaderMessage::Released => "released",
            ReaderMessage::Unknown => "unknown",
        }
    }
}
