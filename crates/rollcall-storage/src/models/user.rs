use chrono::{DateTime, Utc};
use rollcall_core::{ReadEvent, StudentNumber};
use serde::{Deserialize, Serialize};

/// A registered card holder.
///
/// Maps to the `users` table. `student_number` is the natural key and is
/// unique across all rows, including soft-deleted ones.
///
/// # Examples
///
/// ```
/// use rollcall_core::StudentNumber;
/// use rollcall_storage::models::User;
/// use chrono::Utc;
///
/// let user = User {
///     id: 1,
///     student_number: StudentNumber::new("S001").unwrap(),
///     name_kanji: "山田太郎".to_string(),
///     name_kana: "ヤマダタロウ".to_string(),
///     birthday: None,
///     publication_date: None,
///     expiry_date: None,
///     is_active: true,
///     deleted: false,
///     created_at: Utc::now(),
/// };
///
/// assert_eq!(user.display_name(), "山田太郎");
/// assert!(user.is_usable());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,

    #[sqlx(try_from = "String")]
    pub student_number: StudentNumber,

    /// Full name as printed on the card
    pub name_kanji: String,

    /// Phonetic name
    pub name_kana: String,

    pub birthday: Option<String>,
    pub publication_date: Option<String>,
    pub expiry_date: Option<String>,

    pub is_active: bool,

    /// Soft-delete flag
    pub deleted: bool,

    pub created_at: DateTime<Utc>,
}

impl User {
    /// Name to show on screen, falling back to the kana name and then to the
    /// student number.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if !self.name_kanji.trim().is_empty() {
            &self.name_kanji
        } else if !self.name_kana.trim().is_empty() {
            &self.name_kana
        } else {
            self.student_number.as_str()
        }
    }

    /// Active and not deleted.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.is_active && !self.deleted
    }
}

/// Fields needed to register a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub student_number: StudentNumber,
    pub name_kanji: String,
    pub name_kana: String,
    pub birthday: Option<String>,
    pub publication_date: Option<String>,
    pub expiry_date: Option<String>,
}

impl NewUser {
    pub fn new(
        student_number: StudentNumber,
        name_kanji: impl Into<String>,
        name_kana: impl Into<String>,
    ) -> Self {
        Self {
            student_number,
            name_kanji: name_kanji.into(),
            name_kana: name_kana.into(),
            birthday: None,
            publication_date: None,
            expiry_date: None,
        }
    }
}

impl From<&ReadEvent> for NewUser {
    fn from(read: &ReadEvent) -> Self {
        Self {
            student_number: read.student_number.clone(),
            name_kanji: read.name_full.clone(),
            name_kana: read.name_short.clone(),
            birthday: read.birthday.clone(),
            publication_date: read.publication_date.clone(),
            expiry_date: read.expiry_date.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(kanji: &str, kana: &str) -> User {
        User {
            id: 7,
            student_number: StudentNumber::new("S007").unwrap(),
            name_kanji: kanji.to_string(),
            name_kana: kana.to_string(),
            birthday: None,
            publication_date: None,
            expiry_date: None,
            is_active: true,
            deleted: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_display_name_fallback() {
        assert_eq!(user("佐藤", "サトウ").display_name(), "佐藤");
        assert_eq!(user("", "サトウ").display_name(), "サトウ");
        assert_eq!(user(" ", "").display_name(), "S007");
    }

    #[test]
    fn test_is_usable() {
        let mut u = user("佐藤", "サトウ");
        assert!(u.is_usable());
        u.deleted = true;
        assert!(!u.is_usable());
        u.deleted = false;
        u.is_active = false;
        assert!(!u.is_usable());
    }

    #[test]
    fn test_new_user_from_read_event() {
        let mut read = ReadEvent::new(StudentNumber::new("S100").unwrap(), "鈴木花子", "スズキハナコ");
        read.birthday = Some("2003-05-01".to_string());

        let new_user = NewUser::from(&read);
        assert_eq!(new_user.student_number.as_str(), "S100");
        assert_eq!(new_user.name_kanji, "鈴木花子");
        assert_eq!(new_user.name_kana, "スズキハナコ");
        assert_eq!(new_user.birthday.as_deref(), Some("2003-05-01"));
        assert_eq!(new_user.expiry_date, None);
    }
}
