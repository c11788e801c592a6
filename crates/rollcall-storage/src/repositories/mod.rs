pub mod attendance_log;
pub mod user;

pub use attendance_log::{AttendanceLogRepository, SqliteAttendanceLogRepository};
pub use user::{SqliteUserRepository, UserRepository};

use rollcall_core::constants::LOG_PAGE_SIZE;

/// `(LIMIT, OFFSET)` for a zero-based page of log rows.
pub(crate) fn page_bounds(page: u32) -> (i64, i64) {
    let limit = i64::from(LOG_PAGE_SIZE);
    (limit, i64::from(page) * limit)
}
