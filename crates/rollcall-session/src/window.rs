//! Pending windows, authentication attempts and dispatch contexts.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rollcall_core::{AttendanceMode, SessionMode, StudentNumber};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

/// Identity of one pending window (and of the attempt it belongs to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowId(Uuid);

impl WindowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WindowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tag of one in-flight dispatch context.
///
/// The session bumps the current tag whenever the context changes (new
/// read, mode change, cancel). Completions carrying an older tag are late
/// and get discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DispatchId(u64);

impl DispatchId {
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A check-in awaiting commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmedCheckIn {
    pub student_number: StudentNumber,
    pub name_full: String,
    pub name_short: String,
    pub display_name: String,
    pub previous: Option<AttendanceMode>,
    pub next: AttendanceMode,
}

/// Deadline-bound slot that ends in exactly one terminal action.
///
/// Both the deadline path and the manual path go through [`consume`],
/// which succeeds only once.
///
/// [`consume`]: PendingWindow::consume
#[derive(Debug, Clone)]
pub struct PendingWindow {
    id: WindowId,
    mode: SessionMode,
    deadline: Instant,
    armed: Option<ArmedCheckIn>,
    consumed: bool,
}

impl PendingWindow {
    pub fn new(mode: SessionMode, timeout: Duration) -> Self {
        Self {
            id: WindowId::new(),
            mode,
            deadline: Instant::now() + timeout,
            armed: None,
            consumed: false,
        }
    }

    /// A CheckIn window carrying the transition to commit.
    pub fn for_check_in(armed: ArmedCheckIn, timeout: Duration) -> Self {
        Self {
            armed: Some(armed),
            ..Self::new(SessionMode::CheckIn, timeout)
        }
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn armed(&self) -> Option<&ArmedCheckIn> {
        self.armed.as_ref()
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Deadline still waiting to fire, if any.
    pub fn pending_deadline(&self) -> Option<Instant> {
        (!self.consumed).then_some(self.deadline)
    }

    /// Claim the terminal action. Returns `false` if it was already claimed.
    pub fn consume(&mut self) -> bool {
        if self.consumed {
            return false;
        }
        self.consumed = true;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Pending,
    Succeeded,
    Failed,
}

/// One Authenticate attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthAttempt {
    id: WindowId,
    state: AttemptState,
}

impl AuthAttempt {
    pub fn new(id: WindowId) -> Self {
        Self {
            id,
            state: AttemptState::Pending,
        }
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        self.state == AttemptState::Pending
    }

    /// Settle a pending attempt. A settled attempt never changes again.
    pub fn resolve(&mut self, succeeded: bool) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.state = if succeeded {
            AttemptState::Succeeded
        } else {
            AttemptState::Failed
        };
        true
    }
}

/// Result of a successful Authenticate attempt, held until Enroll takes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Authorization {
    pub student_number: StudentNumber,
    pub display_name: String,
    pub granted_at: DateTime<Utc>,
}
