//! The data collaborator seen by the session.

use crate::connection::{Database, DatabaseConfig};
use crate::error::{StorageError, StorageResult};
use crate::models::{AttendanceLog, AttendanceLogView, NewUser, User, UserStatus};
use crate::repositories::{
    AttendanceLogRepository, SqliteAttendanceLogRepository, SqliteUserRepository, UserRepository,
};
use crate::transaction;
use chrono::{DateTime, Utc};
use rollcall_core::{AttendanceMode, OperationalDay, SelectedBy, StudentNumber, SubscribedBy};
use std::future::Future;
use tracing::{debug, info};

/// Persistence operations the session and the CLI depend on.
///
/// Every returned future is `Send` so callers can hold it across a
/// `tokio::select!` inside a spawned task.
pub trait AttendanceStore: Send + Sync + 'static {
    /// Active, non-deleted user with this student number.
    fn find_user_by_student_number(
        &self,
        student_number: &StudentNumber,
    ) -> impl Future<Output = StorageResult<Option<User>>> + Send;

    /// Register a user. `StorageError::Conflict` if the student number exists.
    fn create_user(&self, user: &NewUser) -> impl Future<Output = StorageResult<User>> + Send;

    /// Latest live log of `user_id` with a timestamp in `[start, end]`.
    fn find_latest_attendance_log(
        &self,
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Future<Output = StorageResult<Option<AttendanceLog>>> + Send;

    /// Record a transition timestamped now. `StorageError::NotFound` for an
    /// unknown student.
    fn append_attendance_log(
        &self,
        student_number: &StudentNumber,
        mode: AttendanceMode,
        subscribed_by: SubscribedBy,
        selected_by: SelectedBy,
    ) -> impl Future<Output = StorageResult<AttendanceLog>> + Send;

    /// Atomically replace a log with a manually selected mode and timestamp.
    fn edit_attendance_log(
        &self,
        log_id: i64,
        mode: AttendanceMode,
        timestamp: DateTime<Utc>,
    ) -> impl Future<Output = StorageResult<AttendanceLog>> + Send;

    fn list_attendance_logs_for_student(
        &self,
        student_number: &StudentNumber,
        page: u32,
    ) -> impl Future<Output = StorageResult<Vec<AttendanceLogView>>> + Send;

    fn list_recent_attendance_logs(
        &self,
        page: u32,
    ) -> impl Future<Output = StorageResult<Vec<AttendanceLogView>>> + Send;

    /// Every active user with their latest mode inside `day`.
    fn list_active_users_with_status(
        &self,
        day: &OperationalDay,
    ) -> impl Future<Output = StorageResult<Vec<UserStatus>>> + Send;
}

/// [`AttendanceStore`] backed by the SQLite repositories.
#[derive(Debug, Clone)]
pub struct SqliteAttendanceStore {
    db: Database,
    users: SqliteUserRepository,
    logs: SqliteAttendanceLogRepository,
}

impl SqliteAttendanceStore {
    pub fn new(db: Database) -> Self {
        let users = SqliteUserRepository::new(db.pool().clone());
        let logs = SqliteAttendanceLogRepository::new(db.pool().clone());
        Self { db, users, logs }
    }

    /// Open (and migrate) the database described by `config`.
    pub async fn open(config: DatabaseConfig) -> StorageResult<Self> {
        Ok(Self::new(Database::new(config).await?))
    }

    pub async fn in_memory() -> StorageResult<Self> {
        Ok(Self::new(Database::in_memory().await?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl AttendanceStore for SqliteAttendanceStore {
    async fn find_user_by_student_number(
        &self,
        student_number: &StudentNumber,
    ) -> StorageResult<Option<User>> {
        self.users.find_by_student_number(student_number).await
    }

    async fn create_user(&self, user: &NewUser) -> StorageResult<User> {
        let created = self.users.create(user, Utc::now()).await?;
        info!(student = %created.student_number, id = created.id, "User registered");
        Ok(created)
    }

    async fn find_latest_attendance_log(
        &self,
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Option<AttendanceLog>> {
        self.logs.find_latest_for_user(user_id, start, end).await
    }

    async fn append_attendance_log(
        &self,
        student_number: &StudentNumber,
        mode: AttendanceMode,
        subscribed_by: SubscribedBy,
        selected_by: SelectedBy,
    ) -> StorageResult<AttendanceLog> {
        let user = self
            .users
            .find_by_student_number(student_number)
            .await?
            .ok_or_else(|| StorageError::not_found("User", "student_number", student_number))?;

        let log = self
            .logs
            .append(user.id, Utc::now(), mode, subscribed_by, selected_by)
            .await?;

        info!(
            student = %student_number,
            mode = %mode,
            subscribed_by = subscribed_by.as_str(),
            selected_by = selected_by.as_str(),
            log_id = log.id,
            "Attendance recorded"
        );
        Ok(log)
    }

    async fn edit_attendance_log(
        &self,
        log_id: i64,
        mode: AttendanceMode,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<AttendanceLog> {
        let mut tx = self.db.pool().begin().await?;
        let replacement = match transaction::replace_attendance_log(&mut tx, log_id, mode, timestamp).await
        {
            Ok(log) => log,
            Err(e) => {
                debug!(log_id, error = %e, "Rolling back attendance log edit");
                tx.rollback().await?;
                return Err(e);
            }
        };
        tx.commit().await?;

        info!(
            log_id,
            replacement_id = replacement.id,
            mode = %mode,
            "Attendance log edited"
        );
        Ok(replacement)
    }

    async fn list_attendance_logs_for_student(
        &self,
        student_number: &StudentNumber,
        page: u32,
    ) -> StorageResult<Vec<AttendanceLogView>> {
        self.logs.list_for_student(student_number, page).await
    }

    async fn list_recent_attendance_logs(&self, page: u32) -> StorageResult<Vec<AttendanceLogView>> {
        self.logs.list_recent(page).await
    }

    async fn list_active_users_with_status(
        &self,
        day: &OperationalDay,
    ) -> StorageResult<Vec<UserStatus>> {
        self.logs.active_user_statuses(day.start(), day.end()).await
    }
}
