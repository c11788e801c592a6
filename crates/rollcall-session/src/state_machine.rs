//! Mode register.
//!
//! The register holds the [`SessionMode`] that currently owns incoming
//! card reads and keeps a bounded history of mode changes for diagnostics.
//! Unlike a device state machine, every mode can be entered from every
//! other mode: the presentation layer decides, the register records.
//!
//! # Examples
//!
//! ```
//! use rollcall_core::SessionMode;
//! use rollcall_session::ModeRegister;
//!
//! let mut register = ModeRegister::new();
//! assert_eq!(register.current(), SessionMode::Idle);
//!
//! register.set(SessionMode::CheckIn);
//! register.set(SessionMode::Idle);
//!
//! assert_eq!(register.history().len(), 2);
//! assert_eq!(register.last_transitions(1)[0].from, SessionMode::CheckIn);
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rollcall_core::SessionMode;
use serde::Serialize;
use tokio::time::Instant;

/// Maximum number of mode changes kept in history.
const MAX_HISTORY_SIZE: usize = 100;

/// A single mode change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeTransition {
    pub from: SessionMode,
    pub to: SessionMode,

    /// Wall-clock time of the change.
    pub at: DateTime<Utc>,
}

/// Current session mode plus a bounded transition history.
#[derive(Debug)]
pub struct ModeRegister {
    current: SessionMode,
    entered_at: Instant,
    history: VecDeque<ModeTransition>,
}

impl ModeRegister {
    pub fn new() -> Self {
        Self {
            current: SessionMode::Idle,
            entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn current(&self) -> SessionMode {
        self.current
    }

    pub fn time_in_current_mode(&self) -> Duration {
        self.entered_at.elapsed()
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<ModeTransition> {
        &self.history
    }

    /// The last `count` transitions, oldest first.
    pub fn last_transitions(&self, count: usize) -> Vec<ModeTransition> {
        let skip = self.history.len().saturating_sub(count);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// Switch to `mode` and record the change.
    ///
    /// Re-entering the current mode is recorded too, since it restarts the
    /// mode's attempt.
    pub fn set(&mut self, mode: SessionMode) -> ModeTransition {
        let transition = ModeTransition {
            from: self.current,
            to: mode,
            at: Utc::now(),
        };

        if self.history.len() >= MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(transition.clone());

        self.current = mode;
        self.entered_at = Instant::now();

        transition
    }
}

impl Default for ModeRegister {
    fn default() -> Self {
        Self::new()
    }
}
