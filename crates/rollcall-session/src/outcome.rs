//! Outcomes sent to the presentation layer.
//!
//! Every outcome is emitted through [`OutcomeBus::emit`] and serialises as
//! `{"event": "...", "payload": ...}`.

use chrono::{DateTime, Utc};
use rollcall_core::{AttendanceMode, ConnectionStatus, SelectedBy, StudentNumber};
use rollcall_storage::{AttendanceLogView, StorageError};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Buffered outcomes per subscriber before the slowest one starts lagging.
pub const DEFAULT_OUTCOME_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum Outcome {
    #[serde(rename = "connection-status")]
    ConnectionStatus(ConnectionStatus),

    #[serde(rename = "card-detected")]
    CardDetected(CheckInPreview),

    #[serde(rename = "checkin-result")]
    CheckIn(Result<AttendanceRecorded, Failure>),

    #[serde(rename = "auth-result")]
    Auth(Result<Identity, Failure>),

    #[serde(rename = "enroll-result")]
    Enroll(Result<EnrolledUser, Failure>),

    #[serde(rename = "log-result")]
    LogLookup(Result<LogPage, Failure>),
}

impl Outcome {
    /// Wire name of the outcome.
    pub fn event(&self) -> &'static str {
        match self {
            Outcome::ConnectionStatus(_) => "connection-status",
            Outcome::CardDetected(_) => "card-detected",
            Outcome::CheckIn(_) => "checkin-result",
            Outcome::Auth(_) => "auth-result",
            Outcome::Enroll(_) => "enroll-result",
            Outcome::LogLookup(_) => "log-result",
        }
    }
}

/// Shown while a CheckIn window is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckInPreview {
    pub student_number: StudentNumber,
    pub name_full: String,
    pub name_short: String,
    pub previous: Option<AttendanceMode>,
    pub next: AttendanceMode,
    /// How long the presentation has to override `next`.
    pub window_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRecorded {
    pub student_number: StudentNumber,
    pub display_name: String,
    pub mode: AttendanceMode,
    pub selected_by: SelectedBy,
    pub log_id: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub student_number: StudentNumber,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrolledUser {
    pub user_id: i64,
    pub student_number: StudentNumber,
    pub display_name: String,
    /// Administrator whose authentication opened the Enroll window. `None`
    /// for users assigned from an unknown CheckIn card.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrolled_by: Option<StudentNumber>,
    /// Set when the user was registered from an unknown CheckIn card and
    /// has to touch again to be checked in.
    pub touch_again: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogPage {
    pub student_number: StudentNumber,
    pub display_name: String,
    pub page: u32,
    pub entries: Vec<AttendanceLogView>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UserNotFound,
    Conflict,
    ServiceError,
    Timeout,
    Unauthorized,
}

/// A user-visible failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_number: Option<StudentNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            student_number: None,
            display_name: None,
            message: message.into(),
        }
    }

    /// Attach who the failure concerns.
    #[must_use]
    pub fn about(mut self, student_number: &StudentNumber, display_name: &str) -> Self {
        self.student_number = Some(student_number.clone());
        if !display_name.is_empty() {
            self.display_name = Some(display_name.to_string());
        }
        self
    }

    pub fn user_not_found(student_number: &StudentNumber, display_name: &str) -> Self {
        Self::new(
            FailureKind::UserNotFound,
            format!("Student {student_number} is not registered"),
        )
        .about(student_number, display_name)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(
            FailureKind::Unauthorized,
            "Enrollment requires a successful authentication first",
        )
    }

    /// Map a data collaborator error at the handler boundary.
    pub fn from_storage(err: &StorageError, student_number: &StudentNumber, display_name: &str) -> Self {
        let kind = match err {
            StorageError::NotFound { .. } => FailureKind::UserNotFound,
            StorageError::Conflict { .. } => FailureKind::Conflict,
            _ => FailureKind::ServiceError,
        };
        Self::new(kind, err.to_string()).about(student_number, display_name)
    }
}

/// Single emission point for outcomes.
#[derive(Debug, Clone)]
pub struct OutcomeBus {
    sender: broadcast::Sender<Outcome>,
}

impl OutcomeBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Outcome> {
        self.sender.subscribe()
    }

    /// Publish an outcome. Having no subscriber is not an error.
    pub fn emit(&self, outcome: Outcome) {
        trace!(event = outcome.event(), "Emitting outcome");
        if self.sender.send(outcome).is_err() {
            debug!("Outcome dropped: no subscribers");
        }
    }
}

impl Default for OutcomeBus {
    fn default() -> Self {
        Self::new(DEFAULT_OUTCOME_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn sn() -> StudentNumber {
        StudentNumber::new("S001").unwrap()
    }

    #[test]
    fn test_connection_status_shape() {
        let value = serde_json::to_value(Outcome::ConnectionStatus(ConnectionStatus::Active)).unwrap();
        assert_eq!(value, json!({"event": "connection-status", "payload": "active"}));
    }

    #[test]
    fn test_failure_shape() {
        let outcome = Outcome::Auth(Err(Failure::user_not_found(&sn(), "山田太郎")));
        let value = serde_json::to_value(outcome).unwrap();

        assert_eq!(value["event"], "auth-result");
        let err = &value["payload"]["Err"];
        assert_eq!(err["kind"], "user_not_found");
        assert_eq!(err["student_number"], "S001");
        assert_eq!(err["display_name"], "山田太郎");
    }

    #[test]
    fn test_unauthorized_omits_identity() {
        let value = serde_json::to_value(Failure::unauthorized()).unwrap();
        assert_eq!(value["kind"], "unauthorized");
        assert!(value.get("student_number").is_none());
    }

    #[rstest]
    #[case(StorageError::not_found("User", "student_number", "S001"), FailureKind::UserNotFound)]
    #[case(StorageError::conflict("User", "student_number", "S001"), FailureKind::Conflict)]
    #[case(StorageError::Validation("bad".into()), FailureKind::ServiceError)]
    #[case(StorageError::Configuration("pool closed".into()), FailureKind::ServiceError)]
    fn test_storage_error_mapping(#[case] err: StorageError, #[case] kind: FailureKind) {
        let failure = Failure::from_storage(&err, &sn(), "");
        assert_eq!(failure.kind, kind);
        assert_eq!(failure.student_number, Some(sn()));
        assert_eq!(failure.display_name, None);
    }

    #[rstest]
    #[case(Outcome::ConnectionStatus(ConnectionStatus::Listening), "connection-status")]
    #[case(Outcome::Enroll(Err(Failure::unauthorized())), "enroll-result")]
    #[case(Outcome::CheckIn(Err(Failure::timeout("late"))), "checkin-result")]
    fn test_event_name_matches_serde(#[case] outcome: Outcome, #[case] event: &str) {
        assert_eq!(outcome.event(), event);
        assert_eq!(serde_json::to_value(&outcome).unwrap()["event"], event);
    }

    #[tokio::test]
    async fn test_bus_fans_out() {
        let bus = OutcomeBus::default();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.emit(Outcome::ConnectionStatus(ConnectionStatus::Listening));

        assert_eq!(a.recv().await.unwrap(), Outcome::ConnectionStatus(ConnectionStatus::Listening));
        assert_eq!(b.recv().await.unwrap(), Outcome::ConnectionStatus(ConnectionStatus::Listening));
    }

    #[test]
    fn test_emit_without_subscribers() {
        OutcomeBus::new(0).emit(Outcome::ConnectionStatus(ConnectionStatus::Disconnected));
    }
}
