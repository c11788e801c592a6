use crate::{
    Result,
    constants::{MAX_STUDENT_NUMBER_LENGTH, MIN_STUDENT_NUMBER_LENGTH},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Student number read from a card.
///
/// # Security
/// Comparison is constant-time, since student numbers double as the
/// credential for admin authentication.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StudentNumber(String);

impl StudentNumber {
    /// Create a student number with validation.
    ///
    /// The value is trimmed before validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidStudentNumber` if:
    /// - The length is not between 1-32 characters
    /// - The value contains non-ASCII or control characters
    pub fn new(number: &str) -> Result<Self> {
        let number = number.trim();

        let len = number.len();
        if !(MIN_STUDENT_NUMBER_LENGTH..=MAX_STUDENT_NUMBER_LENGTH).contains(&len) {
            return Err(Error::InvalidStudentNumber(format!(
                "must be {MIN_STUDENT_NUMBER_LENGTH}-{MAX_STUDENT_NUMBER_LENGTH} chars, got {len}"
            )));
        }

        if !number.chars().all(|c| c.is_ascii_graphic()) {
            return Err(Error::InvalidStudentNumber(format!(
                "must be printable ASCII: {number:?}"
            )));
        }

        Ok(StudentNumber(number.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudentNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for StudentNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        StudentNumber::new(s)
    }
}

impl TryFrom<String> for StudentNumber {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        StudentNumber::new(&value)
    }
}

impl From<StudentNumber> for String {
    fn from(value: StudentNumber) -> Self {
        value.0
    }
}

impl PartialEq for StudentNumber {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::hash::Hash for StudentNumber {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Attendance state recorded in a log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceMode {
    In,
    Out,
    Rest,
}

impl AttendanceMode {
    /// Derive the next mode from the latest mode of the operational day.
    ///
    /// The table is fixed: `in -> out`, `out -> in`, `rest -> in`, no log -> `in`.
    ///
    /// ```
    /// use rollcall_core::AttendanceMode;
    ///
    /// assert_eq!(AttendanceMode::toggled_from(None), AttendanceMode::In);
    /// assert_eq!(AttendanceMode::toggled_from(Some(AttendanceMode::In)), AttendanceMode::Out);
    /// ```
    #[must_use]
    pub fn toggled_from(previous: Option<AttendanceMode>) -> AttendanceMode {
        match previous {
            Some(AttendanceMode::In) => AttendanceMode::Out,
            Some(AttendanceMode::Out) | Some(AttendanceMode::Rest) | None => AttendanceMode::In,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceMode::In => "in",
            AttendanceMode::Out => "out",
            AttendanceMode::Rest => "rest",
        }
    }
}

impl fmt::Display for AttendanceMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AttendanceMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" => Ok(AttendanceMode::In),
            "out" => Ok(AttendanceMode::Out),
            "rest" => Ok(AttendanceMode::Rest),
            other => Err(Error::InvalidMode(other.to_string())),
        }
    }
}

impl TryFrom<String> for AttendanceMode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// How a log row was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscribedBy {
    Card,
    Manual,
}

impl SubscribedBy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SubscribedBy::Card => "card",
            SubscribedBy::Manual => "manual",
        }
    }
}

impl std::str::FromStr for SubscribedBy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "card" => Ok(SubscribedBy::Card),
            "manual" => Ok(SubscribedBy::Manual),
            other => Err(Error::InvalidMode(other.to_string())),
        }
    }
}

impl TryFrom<String> for SubscribedBy {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Who chose the mode of a log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectedBy {
    System,
    Manual,
}

impl SelectedBy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SelectedBy::System => "system",
            SelectedBy::Manual => "manual",
        }
    }
}

impl std::str::FromStr for SelectedBy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "system" => Ok(SelectedBy::System),
            "manual" => Ok(SelectedBy::Manual),
            other => Err(Error::InvalidMode(other.to_string())),
        }
    }
}

impl TryFrom<String> for SelectedBy {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Which intent currently owns incoming card reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    Idle,
    CheckIn,
    Authenticate,
    Enroll,
    LogLookup,
}

impl SessionMode {
    /// Returns `true` for modes that end in a single terminal outcome and
    /// then fall back to `Idle`.
    #[inline]
    #[must_use]
    pub fn is_one_shot(self) -> bool {
        matches!(self, SessionMode::Authenticate | SessionMode::Enroll)
    }

    #[inline]
    #[must_use]
    pub fn is_idle(self) -> bool {
        matches!(self, SessionMode::Idle)
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            SessionMode::Idle => "Idle",
            SessionMode::CheckIn => "CheckIn",
            SessionMode::Authenticate => "Authenticate",
            SessionMode::Enroll => "Enroll",
            SessionMode::LogLookup => "LogLookup",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for SessionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "idle" => Ok(SessionMode::Idle),
            "checkin" | "check_in" | "check-in" => Ok(SessionMode::CheckIn),
            "auth" | "authenticate" => Ok(SessionMode::Authenticate),
            "enroll" => Ok(SessionMode::Enroll),
            "lookup" | "log_lookup" | "log-lookup" => Ok(SessionMode::LogLookup),
            other => Err(Error::InvalidMode(other.to_string())),
        }
    }
}

/// Socket-level state of the reader transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No reader connected, or the listener is down.
    #[default]
    Disconnected,
    /// Listener is up and settled, waiting for the reader.
    Listening,
    /// A reader connection is open.
    Active,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Listening => write!(f, "Listening"),
            ConnectionStatus::Active => write!(f, "Active"),
        }
    }
}

/// One card read, as handed from the transport to the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadEvent {
    pub student_number: StudentNumber,
    /// Full display name (kanji on the reference cards).
    pub name_full: String,
    /// Short or phonetic display name (kana on the reference cards).
    pub name_short: String,
    pub birthday: Option<String>,
    pub publication_date: Option<String>,
    pub expiry_date: Option<String>,
}

impl ReadEvent {
    /// Build a read carrying only the required fields.
    pub fn new(
        student_number: StudentNumber,
        name_full: impl Into<String>,
        name_short: impl Into<String>,
    ) -> Self {
        Self {
            student_number,
            name_full: name_full.into(),
            name_short: name_short.into(),
            birthday: None,
            publication_date: None,
            expiry_date: None,
        }
    }

    /// Name to show the user, falling back to the short name and then the
    /// student number when the card carries no full name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if !self.name_full.trim().is_empty() {
            &self.name_full
        } else if !self.name_short.trim().is_empty() {
            &self.name_short
        } else {
            self.student_number.as_str()
        }
    }
}
