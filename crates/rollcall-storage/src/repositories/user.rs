#![allow(async_fn_in_trait)]

use crate::error::{StorageError, StorageResult, is_unique_violation};
use crate::models::{NewUser, User};
use chrono::{DateTime, Utc};
use rollcall_core::StudentNumber;
use sqlx::SqlitePool;

/// Repository trait for User entity operations
///
/// Lookups by student number only see users that are active and not
/// soft-deleted. Lookups by id see every row.
pub trait UserRepository: Send + Sync {
    /// Find an active, non-deleted user by student number
    async fn find_by_student_number(
        &self,
        student_number: &StudentNumber,
    ) -> StorageResult<Option<User>>;

    /// Find a user by their ID
    async fn find_by_id(&self, id: i64) -> StorageResult<Option<User>>;

    /// Get all active users, ordered by student number
    async fn find_all_active(&self) -> StorageResult<Vec<User>>;

    /// Insert a user and return the stored row.
    ///
    /// Fails with `StorageError::Conflict` when the student number is taken.
    async fn create(&self, user: &NewUser, created_at: DateTime<Utc>) -> StorageResult<User>;

    /// Check if a student number already exists, deleted rows included
    async fn exists_by_student_number(&self, student_number: &StudentNumber)
    -> StorageResult<bool>;
}

/// SQLite implementation of UserRepository
#[derive(Debug, Clone)]
pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl UserRepository for SqliteUserRepository {
    async fn find_by_student_number(
        &self,
        student_number: &StudentNumber,
    ) -> StorageResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, student_number, name_kanji, name_kana,
                   birthday, publication_date, expiry_date,
                   is_active, deleted, created_at
            FROM users
            WHERE student_number = ? AND is_active = 1 AND deleted = 0
            "#,
        )
        .bind(student_number.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> StorageResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, student_number, name_kanji, name_kana,
                   birthday, publication_date, expiry_date,
                   is_active, deleted, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_all_active(&self) -> StorageResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, student_number, name_kanji, name_kana,
                   birthday, publication_date, expiry_date,
                   is_active, deleted, created_at
            FROM users
            WHERE is_active = 1 AND deleted = 0
            ORDER BY student_number
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn create(&self, user: &NewUser, created_at: DateTime<Utc>) -> StorageResult<User> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (
                student_number, name_kanji, name_kana,
                birthday, publication_date, expiry_date,
                is_active, deleted, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, 1, 0, ?)
            "#,
        )
        .bind(user.student_number.as_str())
        .bind(&user.name_kanji)
        .bind(&user.name_kana)
        .bind(&user.birthday)
        .bind(&user.publication_date)
        .bind(&user.expiry_date)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::conflict("User", "student_number", &user.student_number)
            } else {
                StorageError::Database(e)
            }
        })?;

        let id = result.last_insert_rowid();
        self.find_by_id(id)
            .await?
            .ok_or_else(|| StorageError::not_found("User", "id", id))
    }

    async fn exists_by_student_number(
        &self,
        student_number: &StudentNumber,
    ) -> StorageResult<bool> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE student_number = ?")
            .bind(student_number.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0 > 0)
    }
}
