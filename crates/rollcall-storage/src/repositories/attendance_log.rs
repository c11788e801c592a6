#![allow(async_fn_in_trait)]

use super::page_bounds;
use crate::error::{StorageError, StorageResult};
use crate::models::{AttendanceLog, AttendanceLogView, UserStatus};
use chrono::{DateTime, Utc};
use rollcall_core::{AttendanceMode, SelectedBy, StudentNumber, SubscribedBy};
use sqlx::SqlitePool;

/// Repository trait for attendance log operations
///
/// Every read ignores soft-deleted rows. Listings are paged by
/// [`LOG_PAGE_SIZE`](rollcall_core::constants::LOG_PAGE_SIZE) and ordered
/// newest first.
pub trait AttendanceLogRepository: Send + Sync {
    /// Find a live log row by ID
    async fn find_by_id(&self, id: i64) -> StorageResult<Option<AttendanceLog>>;

    /// Latest row of `user_id` with `start <= timestamp <= end`
    async fn find_latest_for_user(
        &self,
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Option<AttendanceLog>>;

    /// Insert a row and return it
    async fn append(
        &self,
        user_id: i64,
        timestamp: DateTime<Utc>,
        mode: AttendanceMode,
        subscribed_by: SubscribedBy,
        selected_by: SelectedBy,
    ) -> StorageResult<AttendanceLog>;

    /// One page of a student's history
    async fn list_for_student(
        &self,
        student_number: &StudentNumber,
        page: u32,
    ) -> StorageResult<Vec<AttendanceLogView>>;

    /// One page of everyone's history
    async fn list_recent(&self, page: u32) -> StorageResult<Vec<AttendanceLogView>>;

    /// Latest mode of every active user within `[start, end]`
    async fn active_user_statuses(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<UserStatus>>;
}

/// SQLite implementation of AttendanceLogRepository
#[derive(Debug, Clone)]
pub struct SqliteAttendanceLogRepository {
    pool: SqlitePool,
}

impl SqliteAttendanceLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct StatusRow {
    user_id: i64,
    student_number: String,
    name_kanji: String,
    name_kana: String,
    mode: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

impl TryFrom<StatusRow> for UserStatus {
    type Error = StorageError;

    fn try_from(row: StatusRow) -> StorageResult<Self> {
        let student_number = StudentNumber::new(&row.student_number)
            .map_err(|e| StorageError::Validation(e.to_string()))?;
        let mode = match row.mode {
            Some(mode) => mode
                .parse()
                .map_err(|e: rollcall_core::Error| StorageError::Validation(e.to_string()))?,
            None => AttendanceMode::Out,
        };

        Ok(UserStatus {
            user_id: row.user_id,
            student_number,
            name_kanji: row.name_kanji,
            name_kana: row.name_kana,
            mode,
            timestamp: row.timestamp,
        })
    }
}

impl AttendanceLogRepository for SqliteAttendanceLogRepository {
    async fn find_by_id(&self, id: i64) -> StorageResult<Option<AttendanceLog>> {
        let log = sqlx::query_as::<_, AttendanceLog>(
            r#"
            SELECT id, user_id, timestamp, mode, subscribed_by, selected_by,
                   deleted, created_at
            FROM attendance_logs
            WHERE id = ? AND deleted = 0
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(log)
    }

    async fn find_latest_for_user(
        &self,
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Option<AttendanceLog>> {
        let log = sqlx::query_as::<_, AttendanceLog>(
            r#"
            SELECT id, user_id, timestamp, mode, subscribed_by, selected_by,
                   deleted, created_at
            FROM attendance_logs
            WHERE user_id = ? AND deleted = 0
              AND timestamp >= ? AND timestamp <= ?
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_optional(&self.pool)
        .await?;

        Ok(log)
    }

    async fn append(
        &self,
        user_id: i64,
        timestamp: DateTime<Utc>,
        mode: AttendanceMode,
        subscribed_by: SubscribedBy,
        selected_by: SelectedBy,
    ) -> StorageResult<AttendanceLog> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_logs (
                user_id, timestamp, mode, subscribed_by, selected_by, deleted, created_at
            )
            VALUES (?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(user_id)
        .bind(timestamp)
        .bind(mode.as_str())
        .bind(subscribed_by.as_str())
        .bind(selected_by.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.find_by_id(id)
            .await?
            .ok_or_else(|| StorageError::not_found("AttendanceLog", "id", id))
    }

    async fn list_for_student(
        &self,
        student_number: &StudentNumber,
        page: u32,
    ) -> StorageResult<Vec<AttendanceLogView>> {
        let (limit, offset) = page_bounds(page);
        let logs = sqlx::query_as::<_, AttendanceLogView>(
            r#"
            SELECT al.id, al.user_id, u.student_number, u.name_kanji, u.name_kana,
                   al.timestamp, al.mode, al.subscribed_by, al.selected_by
            FROM attendance_logs al
            JOIN users u ON al.user_id = u.id
            WHERE u.student_number = ? AND al.deleted = 0
            ORDER BY al.timestamp DESC, al.id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(student_number.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }

    async fn list_recent(&self, page: u32) -> StorageResult<Vec<AttendanceLogView>> {
        let (limit, offset) = page_bounds(page);
        let logs = sqlx::query_as::<_, AttendanceLogView>(
            r#"
            SELECT al.id, al.user_id, u.student_number, u.name_kanji, u.name_kana,
                   al.timestamp, al.mode, al.subscribed_by, al.selected_by
            FROM attendance_logs al
            JOIN users u ON al.user_id = u.id
            WHERE al.deleted = 0
            ORDER BY al.timestamp DESC, al.id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }

    async fn active_user_statuses(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Vec<UserStatus>> {
        let rows = sqlx::query_as::<_, StatusRow>(
            r#"
            SELECT u.id AS user_id, u.student_number, u.name_kanji, u.name_kana,
                   latest.mode AS mode, latest.timestamp AS timestamp
            FROM users u
            LEFT JOIN attendance_logs latest ON latest.id = (
                SELECT al.id
                FROM attendance_logs al
                WHERE al.user_id = u.id AND al.deleted = 0
                  AND al.timestamp >= ? AND al.timestamp <= ?
                ORDER BY al.timestamp DESC, al.id DESC
                LIMIT 1
            )
            WHERE u.is_active = 1 AND u.deleted = 0
            ORDER BY u.student_number
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(UserStatus::try_from).collect()
    }
}
