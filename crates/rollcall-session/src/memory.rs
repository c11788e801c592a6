//! In-memory [`AttendanceStore`] for tests.
//!
//! Records every `append_attendance_log` call, can inject one failure, and
//! can delay every call to exercise late results.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rollcall_core::constants::LOG_PAGE_SIZE;
use rollcall_core::{AttendanceMode, OperationalDay, SelectedBy, StudentNumber, SubscribedBy};
use rollcall_storage::{
    AttendanceLog, AttendanceLogView, AttendanceStore, NewUser, StorageError, StorageResult, User,
    UserStatus,
};

/// One recorded `append_attendance_log` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendCall {
    pub student_number: StudentNumber,
    pub mode: AttendanceMode,
    pub subscribed_by: SubscribedBy,
    pub selected_by: SelectedBy,
}

#[derive(Debug, Default)]
struct Inner {
    users: Vec<User>,
    logs: Vec<AttendanceLog>,
    appended: Vec<AppendCall>,
    fail_next: Option<StorageError>,
    latency: Duration,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an active user directly.
    pub fn add_user(&self, student_number: &str, name_kanji: &str, name_kana: &str) -> StorageResult<User> {
        let student_number = StudentNumber::new(student_number)
            .map_err(|e| StorageError::Validation(e.to_string()))?;
        let mut inner = self.lock();
        inner.insert_user(&NewUser::new(student_number, name_kanji, name_kana))
    }

    pub fn has_user(&self, student_number: &str) -> bool {
        self.lock()
            .users
            .iter()
            .any(|u| u.student_number.as_str() == student_number)
    }

    /// Insert a log inside the current operational day.
    pub fn seed_log_today(&self, student_number: &str, mode: AttendanceMode) -> StorageResult<AttendanceLog> {
        let day = OperationalDay::current().map_err(|e| StorageError::Validation(e.to_string()))?;
        self.seed_log_at(student_number, mode, day.start() + chrono::Duration::minutes(1))
    }

    /// Insert a log at an arbitrary time.
    pub fn seed_log_at(
        &self,
        student_number: &str,
        mode: AttendanceMode,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<AttendanceLog> {
        let mut inner = self.lock();
        let user_id = inner
            .users
            .iter()
            .find(|u| u.student_number.as_str() == student_number)
            .map(|u| u.id)
            .ok_or_else(|| StorageError::not_found("User", "student_number", student_number))?;
        Ok(inner.insert_log(Some(user_id), timestamp, mode, SubscribedBy::Card, SelectedBy::System))
    }

    /// Calls to `append_attendance_log`, in order.
    pub fn appended(&self) -> Vec<AppendCall> {
        self.lock().appended.clone()
    }

    /// Make the next store call fail with `err`.
    pub fn fail_next(&self, err: StorageError) {
        self.lock().fail_next = Some(err);
    }

    /// Delay every store call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    async fn enter(&self) -> StorageResult<()> {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match self.lock().fail_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Inner {
    fn insert_user(&mut self, user: &NewUser) -> StorageResult<User> {
        if self.users.iter().any(|u| u.student_number == user.student_number) {
            return Err(StorageError::conflict("User", "student_number", &user.student_number));
        }
        let created = User {
            id: self.users.len() as i64 + 1,
            student_number: user.student_number.clone(),
            name_kanji: user.name_kanji.clone(),
            name_kana: user.name_kana.clone(),
            birthday: user.birthday.clone(),
            publication_date: user.publication_date.clone(),
            expiry_date: user.expiry_date.clone(),
            is_active: true,
            deleted: false,
            created_at: Utc::now(),
        };
        self.users.push(created.clone());
        Ok(created)
    }

    fn insert_log(
        &mut self,
        user_id: Option<i64>,
        timestamp: DateTime<Utc>,
        mode: AttendanceMode,
        subscribed_by: SubscribedBy,
        selected_by: SelectedBy,
    ) -> AttendanceLog {
        let log = AttendanceLog {
            id: self.logs.len() as i64 + 1,
            user_id,
            timestamp,
            mode,
            subscribed_by,
            selected_by,
            deleted: false,
            created_at: Utc::now(),
        };
        self.logs.push(log.clone());
        log
    }

    fn active_user(&self, student_number: &StudentNumber) -> Option<&User> {
        self.users
            .iter()
            .find(|u| &u.student_number == student_number && u.is_usable())
    }

    fn latest_in(&self, user_id: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<&AttendanceLog> {
        self.logs
            .iter()
            .filter(|l| !l.deleted && l.user_id == Some(user_id))
            .filter(|l| start <= l.timestamp && l.timestamp <= end)
            .max_by_key(|l| (l.timestamp, l.id))
    }

    fn views(&self, filter: impl Fn(&User) -> bool, page: u32) -> Vec<AttendanceLogView> {
        let mut views: Vec<AttendanceLogView> = self
            .logs
            .iter()
            .filter(|l| !l.deleted)
            .filter_map(|l| {
                let user = self.users.iter().find(|u| Some(u.id) == l.user_id)?;
                filter(user).then(|| AttendanceLogView {
                    id: l.id,
                    user_id: user.id,
                    student_number: user.student_number.clone(),
                    name_kanji: user.name_kanji.clone(),
                    name_kana: user.name_kana.clone(),
                    timestamp: l.timestamp,
                    mode: l.mode,
                    subscribed_by: l.subscribed_by,
                    selected_by: l.selected_by,
                })
            })
            .collect();
        views.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));

        let size = LOG_PAGE_SIZE as usize;
        views.into_iter().skip(page as usize * size).take(size).collect()
    }
}

impl AttendanceStore for MemoryStore {
    async fn find_user_by_student_number(
        &self,
        student_number: &StudentNumber,
    ) -> StorageResult<Option<User>> {
        self.enter().await?;
        Ok(self.lock().active_user(student_number).cloned())
    }

    async fn create_user(&self, user: &NewUser) -> StorageResult<User> {
        self.enter().await?;
        self.lock().insert_user(user)
    }

    async fn find_latest_attendance_log(
        &self,
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StorageResult<Option<AttendanceLog>> {
        self.enter().await?;
        Ok(self.lock().latest_in(user_id, start, end).cloned())
    }

    async fn append_attendance_log(
        &self,
        student_number: &StudentNumber,
        mode: AttendanceMode,
        subscribed_by: SubscribedBy,
        selected_by: SelectedBy,
    ) -> StorageResult<AttendanceLog> {
        self.enter().await?;
        let mut inner = self.lock();
        inner.appended.push(AppendCall {
            student_number: student_number.clone(),
            mode,
            subscribed_by,
            selected_by,
        });
        let user_id = inner
            .active_user(student_number)
            .map(|u| u.id)
            .ok_or_else(|| StorageError::not_found("User", "student_number", student_number))?;
        Ok(inner.insert_log(Some(user_id), Utc::now(), mode, subscribed_by, selected_by))
    }

    async fn edit_attendance_log(
        &self,
        log_id: i64,
        mode: AttendanceMode,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<AttendanceLog> {
        self.enter().await?;
        let mut inner = self.lock();
        let original = inner
            .logs
            .iter_mut()
            .find(|l| l.id == log_id && !l.deleted)
            .ok_or_else(|| StorageError::not_found("AttendanceLog", "id", log_id))?;
        original.deleted = true;
        let (user_id, subscribed_by) = (original.user_id, original.subscribed_by);

        Ok(inner.insert_log(user_id, timestamp, mode, subscribed_by, SelectedBy::Manual))
    }

    async fn list_attendance_logs_for_student(
        &self,
        student_number: &StudentNumber,
        page: u32,
    ) -> StorageResult<Vec<AttendanceLogView>> {
        self.enter().await?;
        Ok(self.lock().views(|u| &u.student_number == student_number, page))
    }

    async fn list_recent_attendance_logs(&self, page: u32) -> StorageResult<Vec<AttendanceLogView>> {
        self.enter().await?;
        Ok(self.lock().views(|_| true, page))
    }

    async fn list_active_users_with_status(
        &self,
        day: &OperationalDay,
    ) -> StorageResult<Vec<UserStatus>> {
        self.enter().await?;
        let inner = self.lock();
        let mut statuses: Vec<UserStatus> = inner
            .users
            .iter()
            .filter(|u| u.is_usable())
            .map(|u| {
                let latest = inner.latest_in(u.id, day.start(), day.end());
                UserStatus {
                    user_id: u.id,
                    student_number: u.student_number.clone(),
                    name_kanji: u.name_kanji.clone(),
                    name_kana: u.name_kana.clone(),
                    mode: latest.map_or(AttendanceMode::Out, |l| l.mode),
                    timestamp: latest.map(|l| l.timestamp),
                }
            })
            .collect();
        statuses.sort_by(|a, b| a.student_number.as_str().cmp(b.student_number.as_str()));
        Ok(statuses)
    }
}
