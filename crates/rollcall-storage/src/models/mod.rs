pub mod attendance_log;
pub mod user;

pub use attendance_log::{AttendanceLog, AttendanceLogView, UserStatus};
pub use user::{NewUser, User};
