use chrono::{DateTime, Utc};
use rollcall_core::{AttendanceMode, SelectedBy, StudentNumber, SubscribedBy};
use serde::{Deserialize, Serialize};

/// One row of the `attendance_logs` table.
///
/// Rows are never updated in place. An edit soft-deletes the row and
/// inserts a replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttendanceLog {
    pub id: i64,

    /// `None` once the owning user row is removed.
    pub user_id: Option<i64>,

    /// When the transition happened
    pub timestamp: DateTime<Utc>,

    #[sqlx(try_from = "String")]
    pub mode: AttendanceMode,

    #[sqlx(try_from = "String")]
    pub subscribed_by: SubscribedBy,

    #[sqlx(try_from = "String")]
    pub selected_by: SelectedBy,

    pub deleted: bool,

    pub created_at: DateTime<Utc>,
}

/// A log row joined with its owner, as listed to an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttendanceLogView {
    pub id: i64,
    pub user_id: i64,

    #[sqlx(try_from = "String")]
    pub student_number: StudentNumber,

    pub name_kanji: String,
    pub name_kana: String,
    pub timestamp: DateTime<Utc>,

    #[sqlx(try_from = "String")]
    pub mode: AttendanceMode,

    #[sqlx(try_from = "String")]
    pub subscribed_by: SubscribedBy,

    #[sqlx(try_from = "String")]
    pub selected_by: SelectedBy,
}

/// Where an active user stands within one operational day.
///
/// Users without a log in the day are reported as `out` with no timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStatus {
    pub user_id: i64,
    pub student_number: StudentNumber,
    pub name_kanji: String,
    pub name_kana: String,
    pub mode: AttendanceMode,
    pub timestamp: Option<DateTime<Utc>>,
}

impl UserStatus {
    /// `true` while the user is on the premises (`in` or `rest`).
    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self.mode, AttendanceMode::In | AttendanceMode::Rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AttendanceMode::In, true)]
    #[case(AttendanceMode::Rest, true)]
    #[case(AttendanceMode::Out, false)]
    fn test_user_status_presence(#[case] mode: AttendanceMode, #[case] present: bool) {
        let status = UserStatus {
            user_id: 1,
            student_number: StudentNumber::new("S001").unwrap(),
            name_kanji: String::new(),
            name_kana: String::new(),
            mode,
            timestamp: None,
        };
        assert_eq!(status.is_present(), present);
    }
}
