//! Presentation commands and the handle that sends them.

use rollcall_core::{AttendanceMode, SessionMode, StudentNumber};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};

use crate::outcome::{Outcome, OutcomeBus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    EnterMode(SessionMode),
    Cancel,
    ConfirmTransition {
        mode: AttendanceMode,
        student_number: StudentNumber,
    },
    AssignNewUser,
    CancelAssign,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session task has stopped")]
    Closed,
}

/// Cloneable front door to a running [`Session`](crate::Session).
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    outcomes: OutcomeBus,
    gate: watch::Receiver<bool>,
    mode: watch::Receiver<SessionMode>,
}

impl SessionHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        outcomes: OutcomeBus,
        gate: watch::Receiver<bool>,
        mode: watch::Receiver<SessionMode>,
    ) -> Self {
        Self {
            commands,
            outcomes,
            gate,
            mode,
        }
    }

    pub async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }

    pub async fn enter_mode(&self, mode: SessionMode) -> Result<(), SessionError> {
        self.send(Command::EnterMode(mode)).await
    }

    pub async fn cancel(&self) -> Result<(), SessionError> {
        self.send(Command::Cancel).await
    }

    pub async fn confirm_transition(
        &self,
        mode: AttendanceMode,
        student_number: StudentNumber,
    ) -> Result<(), SessionError> {
        self.send(Command::ConfirmTransition {
            mode,
            student_number,
        })
        .await
    }

    pub async fn assign_new_user(&self) -> Result<(), SessionError> {
        self.send(Command::AssignNewUser).await
    }

    pub async fn cancel_assign(&self) -> Result<(), SessionError> {
        self.send(Command::CancelAssign).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Outcome> {
        self.outcomes.subscribe()
    }

    /// The `awaiting_read` gate, for the reader transport.
    pub fn gate(&self) -> watch::Receiver<bool> {
        self.gate.clone()
    }

    pub fn awaiting_read(&self) -> bool {
        *self.gate.borrow()
    }

    pub fn mode(&self) -> SessionMode {
        *self.mode.borrow()
    }

    /// Watch mode changes.
    pub fn mode_changes(&self) -> watch::Receiver<SessionMode> {
        self.mode.clone()
    }
}
