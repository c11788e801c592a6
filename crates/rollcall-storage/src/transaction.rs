//! Transaction-aware operations for atomic multistep changes.
//!
//! These functions take an open SQLite transaction so several statements
//! can commit or roll back together. The caller owns the transaction:
//! commit on success, or drop it (or call `rollback()`) on error.
//!
//! # Usage Pattern
//!
//! ```no_run
//! use chrono::Utc;
//! use rollcall_core::AttendanceMode;
//! use rollcall_storage::{Database, DatabaseConfig, transaction};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("rollcall.db")).await?;
//!
//! let mut tx = db.pool().begin().await?;
//! let replacement =
//!     transaction::replace_attendance_log(&mut tx, 42, AttendanceMode::Out, Utc::now()).await?;
//! tx.commit().await?;
//!
//! println!("log 42 replaced by {}", replacement.id);
//! # Ok(())
//! # }
//! ```

use crate::error::{StorageError, StorageResult};
use crate::models::AttendanceLog;
use chrono::{DateTime, Utc};
use rollcall_core::{AttendanceMode, SelectedBy};
use sqlx::{Sqlite, Transaction};

/// Fetch a live log row within a transaction
pub async fn find_attendance_log(
    tx: &mut Transaction<'_, Sqlite>,
    log_id: i64,
) -> StorageResult<Option<AttendanceLog>> {
    let log = sqlx::query_as::<_, AttendanceLog>(
        r#"
        SELECT id, user_id, timestamp, mode, subscribed_by, selected_by,
               deleted, created_at
        FROM attendance_logs
        WHERE id = ? AND deleted = 0
        "#,
    )
    .bind(log_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(log)
}

/// Soft-delete a live log row within a transaction
///
/// # Errors
///
/// Returns `StorageError::NotFound` if the row is absent or already deleted.
pub async fn soft_delete_attendance_log(
    tx: &mut Transaction<'_, Sqlite>,
    log_id: i64,
) -> StorageResult<()> {
    let result = sqlx::query("UPDATE attendance_logs SET deleted = 1 WHERE id = ? AND deleted = 0")
        .bind(log_id)
        .execute(&mut **tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("AttendanceLog", "id", log_id));
    }

    Ok(())
}

/// Replace a log row with a corrected copy
///
/// The old row is soft-deleted and a new row is inserted with the same
/// owner and `subscribed_by`, the given `mode` and `timestamp`, and
/// `selected_by = manual`.
///
/// # Returns
///
/// The replacement row.
///
/// # Errors
///
/// Returns `StorageError::NotFound` if `log_id` is absent or already
/// deleted. Nothing has been written at that point, but the caller should
/// still drop the transaction.
pub async fn replace_attendance_log(
    tx: &mut Transaction<'_, Sqlite>,
    log_id: i64,
    mode: AttendanceMode,
    timestamp: DateTime<Utc>,
) -> StorageResult<AttendanceLog> {
    let original = find_attendance_log(tx, log_id)
        .await?
        .ok_or_else(|| StorageError::not_found("AttendanceLog", "id", log_id))?;

    soft_delete_attendance_log(tx, log_id).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO attendance_logs (
            user_id, timestamp, mode, subscribed_by, selected_by, deleted, created_at
        )
        VALUES (?, ?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(original.user_id)
    .bind(timestamp)
    .bind(mode.as_str())
    .bind(original.subscribed_by.as_str())
    .bind(SelectedBy::Manual.as_str())
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;

    let id = result.last_insert_rowid();
    find_attendance_log(tx, id)
        .await?
        .ok_or_else(|| StorageError::not_found("AttendanceLog", "id", id))
}
