//! SQLite persistence for the rollcall coordinator.
//!
//! The session only sees the [`AttendanceStore`] trait. This crate ships
//! the SQLite implementation, built from two repositories over one pool:
//!
//! - [`Database`] - connection pool with embedded migrations
//! - [`UserRepository`], [`AttendanceLogRepository`] - data access traits
//! - [`transaction`] - statements that must commit together
//! - [`SqliteAttendanceStore`] - the store handed to the session
//!
//! Deletion is always soft: rows carry a `deleted` flag and every query
//! filters on it.
//!
//! # Example
//!
//! ```no_run
//! use rollcall_core::{AttendanceMode, OperationalDay, SelectedBy, StudentNumber, SubscribedBy};
//! use rollcall_storage::{AttendanceStore, DatabaseConfig, SqliteAttendanceStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteAttendanceStore::open(DatabaseConfig::new("rollcall.db")).await?;
//!
//! let student = StudentNumber::new("S001")?;
//! if store.find_user_by_student_number(&student).await?.is_some() {
//!     store
//!         .append_attendance_log(&student, AttendanceMode::In, SubscribedBy::Card, SelectedBy::System)
//!         .await?;
//! }
//!
//! for status in store.list_active_users_with_status(&OperationalDay::current()?).await? {
//!     println!("{} {}", status.student_number, status.mode);
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;
pub mod store;
pub mod transaction;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use models::{AttendanceLog, AttendanceLogView, NewUser, User, UserStatus};
pub use repositories::{
    AttendanceLogRepository, SqliteAttendanceLogRepository, SqliteUserRepository, UserRepository,
};
pub use store::{AttendanceStore, SqliteAttendanceStore};
