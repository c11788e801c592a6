//! Card-read session coordinator.
//!
//! A [`Session`] owns the current [`SessionMode`](rollcall_core::SessionMode),
//! the `awaiting_read` gate, at most one pending decision window, the
//! authentication state and the read buffer. Card reads arrive from the
//! reader transport, commands arrive through a [`SessionHandle`], and every
//! result leaves as an [`Outcome`] on the [`OutcomeBus`].

pub mod command;
pub mod handlers;
pub mod memory;
pub mod outcome;
pub mod session;
pub mod state_machine;
pub mod window;

pub use command::{Command, SessionError, SessionHandle};
pub use handlers::CheckInLookup;
pub use memory::{AppendCall, MemoryStore};
pub use outcome::{
    AttendanceRecorded, CheckInPreview, EnrolledUser, Failure, FailureKind, Identity, LogPage,
    Outcome, OutcomeBus,
};
pub use session::{Session, SessionConfig};
pub use state_machine::{ModeRegister, ModeTransition};
pub use window::{
    ArmedCheckIn, AttemptState, AuthAttempt, Authorization, DispatchId, PendingWindow, WindowId,
};
