//! Session task.
//!
//! One task owns every piece of session state and runs a single
//! `select!` loop over transport events, presentation commands, the
//! pending-window deadline, the re-arm deadline and in-flight handler
//! futures. Handlers never touch session state; they resolve to a
//! [`Completion`] that the loop applies after checking its dispatch tag.
//!
//! The `awaiting_read` gate is a `watch` channel shared with the reader
//! transport, which drops reads while it is `false`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use rollcall_core::constants::{DEFAULT_REARM_DELAY_MS, DEFAULT_WINDOW_TIMEOUT_MS};
use rollcall_core::{AttendanceMode, ReadEvent, SelectedBy, SessionMode, StudentNumber};
use rollcall_reader::TransportEvent;
use rollcall_storage::AttendanceStore;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::command::{Command, SessionHandle};
use crate::handlers::{self, CheckInLookup};
use crate::outcome::{
    AttendanceRecorded, CheckInPreview, EnrolledUser, Failure, Identity, LogPage, Outcome,
    OutcomeBus,
};
use crate::state_machine::{ModeRegister, ModeTransition};
use crate::window::{ArmedCheckIn, AuthAttempt, Authorization, DispatchId, PendingWindow};

const COMMAND_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Lifetime of CheckIn, Authenticate and Enroll windows.
    pub window_timeout: Duration,
    /// Delay before re-arming after an unknown CheckIn card.
    pub rearm_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window_timeout: Duration::from_millis(DEFAULT_WINDOW_TIMEOUT_MS),
            rearm_delay: Duration::from_millis(DEFAULT_REARM_DELAY_MS),
        }
    }
}

enum Resolved {
    CheckInLookup {
        read: ReadEvent,
        result: Result<CheckInLookup, Failure>,
    },
    CheckInCommit(Result<AttendanceRecorded, Failure>),
    Auth(Result<Identity, Failure>),
    Enroll(Result<EnrolledUser, Failure>),
    Assign(Result<EnrolledUser, Failure>),
    LogLookup(Result<LogPage, Failure>),
}

struct Completion {
    dispatch: DispatchId,
    resolved: Resolved,
}

/// The card-read session state machine.
pub struct Session<S> {
    store: Arc<S>,
    config: SessionConfig,
    register: ModeRegister,
    gate: watch::Sender<bool>,
    mode: watch::Sender<SessionMode>,
    outcomes: OutcomeBus,
    commands: mpsc::Receiver<Command>,
    reads: mpsc::Receiver<TransportEvent>,

    window: Option<PendingWindow>,
    attempt: Option<AuthAttempt>,
    authorization: Option<Authorization>,
    enroll_operator: Option<StudentNumber>,
    read_buffer: Option<ReadEvent>,
    offer: Option<ReadEvent>,
    rearm_at: Option<Instant>,

    dispatch: DispatchId,
    in_flight: FuturesUnordered<BoxFuture<'static, Completion>>,
}

impl<S: AttendanceStore> Session<S> {
    /// Build a session fed by `reads`, plus the handle that drives it.
    pub fn new(
        store: Arc<S>,
        config: SessionConfig,
        reads: mpsc::Receiver<TransportEvent>,
    ) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (gate, gate_rx) = watch::channel(false);
        let (mode, mode_rx) = watch::channel(SessionMode::Idle);
        let outcomes = OutcomeBus::default();

        let handle = SessionHandle::new(command_tx, outcomes.clone(), gate_rx, mode_rx);
        let session = Self {
            store,
            config,
            register: ModeRegister::new(),
            gate,
            mode,
            outcomes,
            commands: command_rx,
            reads,
            window: None,
            attempt: None,
            authorization: None,
            enroll_operator: None,
            read_buffer: None,
            offer: None,
            rearm_at: None,
            dispatch: DispatchId::default(),
            in_flight: FuturesUnordered::new(),
        };
        (session, handle)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until every [`SessionHandle`] is dropped.
    pub async fn run(mut self) {
        info!(
            window_timeout_ms = self.config.window_timeout.as_millis() as u64,
            rearm_delay_ms = self.config.rearm_delay.as_millis() as u64,
            "Session started"
        );
        let mut reads_open = true;

        loop {
            let window_deadline = self.window.as_ref().and_then(PendingWindow::pending_deadline);
            let rearm_deadline = self.rearm_at;
            let has_in_flight = !self.in_flight.is_empty();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        info!("All session handles dropped, stopping session");
                        break;
                    }
                },
                event = self.reads.recv(), if reads_open => match event {
                    Some(TransportEvent::Read(read)) => self.ingest(read),
                    Some(TransportEvent::Status(status)) => {
                        self.outcomes.emit(Outcome::ConnectionStatus(status));
                    }
                    None => {
                        debug!("Transport event channel closed");
                        reads_open = false;
                    }
                },
                _ = sleep_until_opt(window_deadline) => self.on_window_deadline(),
                _ = sleep_until_opt(rearm_deadline) => self.on_rearm(),
                Some(completion) = self.in_flight.next(), if has_in_flight => {
                    self.on_completion(completion);
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        debug!(command = ?command, "Session command");
        match command {
            Command::EnterMode(mode) => self.enter_mode(mode),
            Command::Cancel => self.cancel(),
            Command::ConfirmTransition {
                mode,
                student_number,
            } => self.confirm_transition(mode, &student_number),
            Command::AssignNewUser => self.assign_new_user(),
            Command::CancelAssign => self.cancel_assign(),
        }
    }

    fn enter_mode(&mut self, mode: SessionMode) {
        self.invalidate_context();

        if mode == SessionMode::Enroll && self.authorization.is_none() {
            warn!("Enrollment requested without authorization");
            self.outcomes.emit(Outcome::Enroll(Err(Failure::unauthorized())));
            self.set_mode(SessionMode::Idle);
            self.set_gate(false);
            return;
        }
        self.set_mode(mode);

        match mode {
            SessionMode::Authenticate => {
                let window = PendingWindow::new(mode, self.config.window_timeout);
                self.attempt = Some(AuthAttempt::new(window.id()));
                self.authorization = None;
                debug!(attempt = %window.id(), "Authentication attempt started");
                self.window = Some(window);
            }
            SessionMode::Enroll => {
                if let Some(authorization) = self.authorization.take() {
                    info!(operator = %authorization.student_number, "Enrollment authorized");
                    self.enroll_operator = Some(authorization.student_number);
                }
                self.window = Some(PendingWindow::new(mode, self.config.window_timeout));
            }
            _ => {}
        }

        self.set_gate(!mode.is_idle());
    }

    fn cancel(&mut self) {
        debug!(mode = %self.register.current(), "Session cancelled");
        if let Some(read) = self.read_buffer.as_ref() {
            debug!(student = %read.student_number, "Buffered read discarded");
        }
        self.invalidate_context();
        if let Some(attempt) = self.attempt.as_mut() {
            attempt.resolve(false);
        }
        self.set_gate(false);
    }

    fn ingest(&mut self, read: ReadEvent) {
        if !*self.gate.borrow() {
            debug!(
                student = %read.student_number,
                mode = %self.register.current(),
                "Read dropped: not awaiting a read"
            );
            return;
        }
        self.set_gate(false);

        let mode = self.register.current();
        info!(student = %read.student_number, mode = %mode, "Card read");
        self.read_buffer = Some(read.clone());
        let dispatch = self.advance_dispatch();
        let store = self.store.clone();

        match mode {
            SessionMode::Idle => debug!("Read dropped: session idle"),
            SessionMode::CheckIn => self.track(dispatch, async move {
                let result = handlers::check_in(store, read.clone()).await;
                Resolved::CheckInLookup { read, result }
            }),
            SessionMode::Authenticate => self.track(dispatch, async move {
                Resolved::Auth(handlers::authenticate(store, read).await)
            }),
            SessionMode::Enroll => {
                // The read is the window's terminal action.
                if let Some(window) = self.window.as_mut() {
                    window.consume();
                }
                let operator = self.enroll_operator.clone();
                self.track(dispatch, async move {
                    Resolved::Enroll(handlers::enroll(store, read, operator, false).await)
                });
            }
            SessionMode::LogLookup => self.track(dispatch, async move {
                Resolved::LogLookup(handlers::log_lookup(store, read).await)
            }),
        }
    }

    fn confirm_transition(&mut self, mode: AttendanceMode, student_number: &StudentNumber) {
        let Some(window) = self.window.as_mut() else {
            warn!(student = %student_number, "Confirm ignored: no pending check-in");
            return;
        };
        let Some(armed) = window.armed().cloned() else {
            warn!(student = %student_number, "Confirm ignored: window is not a check-in");
            return;
        };
        if &armed.student_number != student_number {
            warn!(
                student = %student_number,
                pending = %armed.student_number,
                "Confirm ignored: student does not match pending check-in"
            );
            return;
        }
        if !window.consume() {
            warn!(student = %student_number, "Confirm ignored: check-in already committed");
            return;
        }

        info!(student = %student_number, mode = %mode, "Check-in confirmed manually");
        self.commit(armed, mode, SelectedBy::Manual);
    }

    fn assign_new_user(&mut self) {
        if self.register.current() != SessionMode::CheckIn {
            warn!(mode = %self.register.current(), "Assign ignored: not in check-in");
            return;
        }
        let Some(read) = self.offer.take() else {
            warn!("Assign ignored: no pending assignment offer");
            return;
        };
        self.rearm_at = None;

        info!(student = %read.student_number, "Assigning new user");
        let dispatch = self.advance_dispatch();
        let store = self.store.clone();
        self.track(dispatch, async move {
            Resolved::Assign(handlers::enroll(store, read, None, true).await)
        });
    }

    fn cancel_assign(&mut self) {
        let had_offer = self.offer.take().is_some();
        let had_timer = self.rearm_at.take().is_some();
        if had_offer || had_timer {
            debug!("Assignment offer cancelled");
            self.rearm_if(SessionMode::CheckIn);
        }
    }

    fn on_window_deadline(&mut self) {
        let Some(window) = self.window.as_mut() else {
            return;
        };
        if !window.consume() {
            return;
        }
        let (id, mode, armed) = (window.id(), window.mode(), window.armed().cloned());

        match mode {
            SessionMode::CheckIn => {
                if let Some(armed) = armed {
                    let next = armed.next;
                    info!(student = %armed.student_number, mode = %next, "Check-in window closed");
                    self.commit(armed, next, SelectedBy::System);
                }
            }
            SessionMode::Authenticate => {
                let timed_out = self
                    .attempt
                    .as_mut()
                    .filter(|attempt| attempt.id() == id)
                    .is_some_and(|attempt| attempt.resolve(false));
                if timed_out {
                    warn!(attempt = %id, "Authentication timed out");
                    let failure = self.timeout_failure("No registered card was presented in time");
                    self.outcomes.emit(Outcome::Auth(Err(failure)));
                    self.return_to_idle();
                }
            }
            SessionMode::Enroll => {
                warn!("Enrollment timed out");
                let failure = self.timeout_failure("No card was presented in time");
                self.outcomes.emit(Outcome::Enroll(Err(failure)));
                self.return_to_idle();
            }
            SessionMode::Idle | SessionMode::LogLookup => {}
        }
    }

    /// A timeout failure naming the card read in this mode, if any.
    fn timeout_failure(&self, message: &str) -> Failure {
        let failure = Failure::timeout(message);
        match &self.read_buffer {
            Some(read) => failure.about(&read.student_number, read.display_name()),
            None => failure,
        }
    }

    fn on_rearm(&mut self) {
        self.rearm_at = None;
        if let Some(read) = self.offer.take() {
            debug!(student = %read.student_number, "Assignment offer expired");
        }
        self.rearm_if(SessionMode::CheckIn);
    }

    fn on_completion(&mut self, completion: Completion) {
        if completion.dispatch != self.dispatch {
            debug!(
                dispatch = %completion.dispatch,
                current = %self.dispatch,
                "Ignoring late result"
            );
            return;
        }

        match completion.resolved {
            Resolved::CheckInLookup { read, result } => self.resolve_check_in(read, result),
            Resolved::CheckInCommit(result) => {
                self.window = None;
                self.outcomes.emit(Outcome::CheckIn(result));
                self.rearm_if(SessionMode::CheckIn);
            }
            Resolved::Auth(result) => self.resolve_auth(result),
            Resolved::Enroll(result) => {
                self.window = None;
                if let Ok(user) = &result {
                    info!(
                        student = %user.student_number,
                        operator = ?user.enrolled_by.as_ref().map(StudentNumber::as_str),
                        "User enrolled"
                    );
                }
                self.outcomes.emit(Outcome::Enroll(result));
                self.return_to_idle();
            }
            Resolved::Assign(result) => {
                self.outcomes.emit(Outcome::Enroll(result));
                self.rearm_if(SessionMode::CheckIn);
            }
            Resolved::LogLookup(result) => {
                self.outcomes.emit(Outcome::LogLookup(result));
                self.rearm_if(SessionMode::LogLookup);
            }
        }
    }

    fn resolve_check_in(&mut self, read: ReadEvent, result: Result<CheckInLookup, Failure>) {
        match result {
            Ok(CheckInLookup::Known(armed)) => {
                self.outcomes.emit(Outcome::CardDetected(CheckInPreview {
                    student_number: armed.student_number.clone(),
                    name_full: armed.name_full.clone(),
                    name_short: armed.name_short.clone(),
                    previous: armed.previous,
                    next: armed.next,
                    window_timeout_ms: self.config.window_timeout.as_millis() as u64,
                }));
                self.window = Some(PendingWindow::for_check_in(armed, self.config.window_timeout));
            }
            Ok(CheckInLookup::Unknown) => {
                info!(student = %read.student_number, "Unknown card, offering assignment");
                self.outcomes.emit(Outcome::CheckIn(Err(Failure::user_not_found(
                    &read.student_number,
                    read.display_name(),
                ))));
                self.offer = Some(read);
                self.rearm_at = Some(Instant::now() + self.config.rearm_delay);
            }
            Err(failure) => {
                self.outcomes.emit(Outcome::CheckIn(Err(failure)));
                self.set_gate(true);
            }
        }
    }

    fn resolve_auth(&mut self, result: Result<Identity, Failure>) {
        if let Some(window) = self.window.as_mut() {
            window.consume();
        }
        if let Some(attempt) = self.attempt.as_mut() {
            attempt.resolve(result.is_ok());
        }

        match &result {
            Ok(identity) => {
                info!(student = %identity.student_number, "Authentication succeeded");
                self.authorization = Some(Authorization {
                    student_number: identity.student_number.clone(),
                    display_name: identity.display_name.clone(),
                    granted_at: Utc::now(),
                });
            }
            Err(failure) => warn!(kind = ?failure.kind, "Authentication failed"),
        }

        self.outcomes.emit(Outcome::Auth(result));
        self.return_to_idle();
    }

    fn commit(&mut self, armed: ArmedCheckIn, mode: AttendanceMode, selected_by: SelectedBy) {
        let dispatch = self.advance_dispatch();
        let store = self.store.clone();
        self.track(dispatch, async move {
            Resolved::CheckInCommit(handlers::commit_check_in(store, armed, mode, selected_by).await)
        });
    }

    fn track(&mut self, dispatch: DispatchId, future: impl Future<Output = Resolved> + Send + 'static) {
        self.in_flight.push(Box::pin(async move {
            Completion {
                dispatch,
                resolved: future.await,
            }
        }));
    }

    fn advance_dispatch(&mut self) -> DispatchId {
        self.dispatch = self.dispatch.next();
        self.dispatch
    }

    /// Drop the window, the in-flight context, the buffered read, the
    /// enrollment operator and any assignment offer.
    fn invalidate_context(&mut self) {
        self.window = None;
        self.read_buffer = None;
        self.enroll_operator = None;
        self.offer = None;
        self.rearm_at = None;
        self.advance_dispatch();
    }

    fn return_to_idle(&mut self) {
        self.invalidate_context();
        self.set_mode(SessionMode::Idle);
        self.set_gate(false);
    }

    fn rearm_if(&mut self, mode: SessionMode) {
        if self.register.current() == mode {
            self.set_gate(true);
        }
    }

    fn set_mode(&mut self, mode: SessionMode) -> ModeTransition {
        let transition = self.register.set(mode);
        if transition.from != transition.to {
            info!(from = %transition.from, to = %transition.to, "Session mode changed");
        }
        self.mode.send_replace(mode);
        transition
    }

    fn set_gate(&mut self, awaiting_read: bool) {
        let previous = self.gate.send_replace(awaiting_read);
        if previous != awaiting_read {
            debug!(awaiting_read, "Read gate changed");
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
