//! Reader transport supervisor.
//!
//! Owns the listener and the external reader process and keeps both alive.
//! Runs as a single task that wakes on control commands, listener events,
//! process exit, and two timers (listener settle and the next scheduled
//! supervision action).
//!
//! ```text
//!   bind ──settle──> Listening ──connect──> Active ──last close──> Disconnected
//!     │
//!     └──launch delay──> launch ──failure──> restart (retry interval) ...
//!                                   │
//!                                   └─ budget exhausted ─> rebind listener,
//!                                                          launch again
//! ```
//!
//! A failure is a peer closing its connection, the process exiting while no
//! reader is connected, or a failed launch. Each launch contributes at most
//! one failure.

use std::collections::HashSet;
use std::net::SocketAddr;

use rollcall_core::{ConnectionStatus, ReadEvent};
use rollcall_network::{
    DisconnectReason, ListenerConfig, ListenerEvent, ListenerHandle, ReaderListener,
};
use rollcall_protocol::ReaderMessage;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use crate::error::{ReaderError, Result};
use crate::policy::{RestartBudget, RestartDecision, RestartPolicy};
use crate::process::AnyReaderProcess;
use crate::traits::{ExitReport, ReaderProcess};

const LISTENER_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    pub listener: ListenerConfig,
    pub policy: RestartPolicy,
}

/// Events delivered to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection status changed.
    Status(ConnectionStatus),
    /// A card read passed the read gate.
    Read(ReadEvent),
}

#[derive(Debug)]
enum Control {
    StopListener,
    StartListener,
    LocalAddr(oneshot::Sender<Option<SocketAddr>>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheduled {
    LaunchProcess,
    RestartProcess,
    RebindListener,
}

/// Handle to a running transport task.
#[derive(Debug)]
pub struct TransportHandle {
    control: mpsc::Sender<Control>,
    task: JoinHandle<()>,
}

impl TransportHandle {
    /// Stop the process and the listener and suspend supervision.
    pub async fn stop_listener(&self) -> Result<()> {
        self.send(Control::StopListener).await
    }

    /// Rebind the listener and resume supervision. No-op when listening.
    pub async fn start_listener(&self) -> Result<()> {
        self.send(Control::StartListener).await
    }

    /// Address the listener is currently bound to.
    pub async fn local_addr(&self) -> Result<Option<SocketAddr>> {
        let (tx, rx) = oneshot::channel();
        self.send(Control::LocalAddr(tx)).await?;
        rx.await.map_err(|_| ReaderError::TransportStopped)
    }

    /// Stop everything and wait for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.control.send(Control::Shutdown).await;
        if let Err(e) = self.task.await
            && e.is_panic()
        {
            error!(error = %e, "Reader transport task panicked");
        }
    }

    async fn send(&self, control: Control) -> Result<()> {
        self.control
            .send(control)
            .await
            .map_err(|_| ReaderError::TransportStopped)
    }
}

pub struct ReaderTransport {
    config: TransportConfig,
    process: AnyReaderProcess,
    gate: watch::Receiver<bool>,
    events: mpsc::Sender<TransportEvent>,

    listener: Option<ListenerHandle>,
    listener_rx: Option<mpsc::Receiver<ListenerEvent>>,
    connections: HashSet<SocketAddr>,
    /// Peers that belonged to a process instance we stopped on purpose.
    stale_peers: HashSet<SocketAddr>,
    status: ConnectionStatus,

    budget: RestartBudget,
    failure_recorded: bool,
    settle_at: Option<Instant>,
    scheduled: Option<(Instant, Scheduled)>,
    suspended: bool,
}

impl ReaderTransport {
    /// `gate` decides whether card reads are forwarded; reads arriving while
    /// it is `false` are dropped.
    pub fn new(
        config: TransportConfig,
        process: AnyReaderProcess,
        gate: watch::Receiver<bool>,
        events: mpsc::Sender<TransportEvent>,
    ) -> Self {
        let budget = RestartBudget::new(&config.policy);
        Self {
            config,
            process,
            gate,
            events,
            listener: None,
            listener_rx: None,
            connections: HashSet::new(),
            stale_peers: HashSet::new(),
            status: ConnectionStatus::Disconnected,
            budget,
            failure_recorded: false,
            settle_at: None,
            scheduled: None,
            suspended: false,
        }
    }

    pub fn spawn(self) -> TransportHandle {
        let (control, control_rx) = mpsc::channel(8);
        let task = tokio::spawn(self.run(control_rx));
        TransportHandle { control, task }
    }

    async fn run(mut self, mut control: mpsc::Receiver<Control>) {
        info!(process = %self.process.describe(), "Reader transport starting");
        self.start_listener().await;

        loop {
            let settle_at = self.settle_at;
            let scheduled_at = self.scheduled.map(|(at, _)| at);
            let process_running = self.process.is_running();

            tokio::select! {
                command = control.recv() => match command {
                    Some(Control::StopListener) => self.suspend().await,
                    Some(Control::StartListener) => self.resume().await,
                    Some(Control::LocalAddr(reply)) => {
                        let _ = reply.send(self.listener.as_ref().map(ListenerHandle::local_addr));
                    }
                    Some(Control::Shutdown) | None => break,
                },
                event = recv_listener(&mut self.listener_rx) => match event {
                    Some(event) => self.on_listener_event(event).await,
                    None => {
                        warn!("Reader listener ended unexpectedly");
                        self.listener_rx = None;
                    }
                },
                exit = self.process.wait_exit(), if process_running => {
                    self.on_process_exit(exit).await;
                }
                () = sleep_until_opt(settle_at) => {
                    self.settle_at = None;
                    if self.connections.is_empty() {
                        self.set_status(ConnectionStatus::Listening).await;
                    }
                }
                () = sleep_until_opt(scheduled_at) => {
                    if let Some((_, action)) = self.scheduled.take() {
                        self.perform(action).await;
                    }
                }
            }
        }

        info!("Reader transport shutting down");
        self.stop_process().await;
        self.stop_listener().await;
    }

    async fn perform(&mut self, action: Scheduled) {
        match action {
            Scheduled::LaunchProcess => self.launch_process().await,
            Scheduled::RestartProcess => {
                info!(
                    failures = self.budget.failures(),
                    max_restarts = self.budget.max_restarts(),
                    "Restarting reader process"
                );
                self.stop_process().await;
                self.launch_process().await;
            }
            Scheduled::RebindListener => self.start_listener().await,
        }
    }

    async fn start_listener(&mut self) {
        if self.listener.is_some() {
            return;
        }

        let listener = match ReaderListener::bind(self.config.listener.clone()).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, "Failed to bind reader listener; retrying");
                self.schedule(self.config.policy.retry_interval, Scheduled::RebindListener);
                return;
            }
        };

        let (tx, rx) = mpsc::channel(LISTENER_EVENT_CAPACITY);
        self.listener = Some(listener.spawn(tx));
        self.listener_rx = Some(rx);

        let now = Instant::now();
        self.settle_at = Some(now + self.config.policy.settle_delay);
        self.schedule(self.config.policy.launch_delay, Scheduled::LaunchProcess);
    }

    async fn stop_listener(&mut self) {
        self.listener_rx = None;
        self.settle_at = None;
        self.connections.clear();
        self.stale_peers.clear();
        if let Some(listener) = self.listener.take() {
            listener.shutdown().await;
        }
        self.set_status(ConnectionStatus::Disconnected).await;
    }

    async fn launch_process(&mut self) {
        self.failure_recorded = false;
        match self.process.start().await {
            Ok(()) => info!(process = %self.process.describe(), "Reader process launched"),
            Err(e) => {
                error!(error = %e, "Reader process failed to launch");
                self.record_failure("launch failed").await;
            }
        }
    }

    async fn stop_process(&mut self) {
        if self.process.is_running() {
            self.stale_peers.extend(self.connections.iter().copied());
        }
        if let Err(e) = self.process.stop().await {
            warn!(error = %e, "Failed to stop reader process");
        }
    }

    async fn record_failure(&mut self, reason: &str) {
        if self.failure_recorded {
            debug!(reason, "Failure already counted for this launch");
            return;
        }
        self.failure_recorded = true;

        match self.budget.record_failure() {
            RestartDecision::RestartProcess { attempt } => {
                warn!(
                    reason,
                    attempt,
                    max_restarts = self.budget.max_restarts(),
                    retry_ms = self.config.policy.retry_interval.as_millis() as u64,
                    "Reader failure; scheduling process restart"
                );
                self.schedule(self.config.policy.retry_interval, Scheduled::RestartProcess);
            }
            RestartDecision::RestartListener => {
                error!(
                    reason,
                    max_restarts = self.budget.max_restarts(),
                    "Reader restart budget exhausted; restarting listener"
                );
                self.scheduled = None;
                self.stop_process().await;
                self.stop_listener().await;
                self.budget.reset();
                self.start_listener().await;
            }
        }
    }

    async fn on_listener_event(&mut self, event: ListenerEvent) {
        match event {
            ListenerEvent::Connected { peer } => {
                self.connections.insert(peer);
                self.set_status(ConnectionStatus::Active).await;
            }
            ListenerEvent::Message { peer, message } => self.on_message(peer, message).await,
            ListenerEvent::ParseFailed { peer, error } => {
                warn!(addr = %peer, error = %error, "Discarded reader message");
            }
            ListenerEvent::Disconnected { peer, reason } => {
                self.connections.remove(&peer);
                if self.connections.is_empty() {
                    self.set_status(ConnectionStatus::Disconnected).await;
                }

                if self.stale_peers.remove(&peer) {
                    debug!(addr = %peer, "Connection of stopped reader closed");
                    return;
                }
                let reason = match reason {
                    DisconnectReason::Closed => "connection closed by reader".to_string(),
                    DisconnectReason::Error(e) => format!("connection error: {e}"),
                };
                self.record_failure(&reason).await;
            }
        }
    }

    async fn on_message(&mut self, peer: SocketAddr, message: ReaderMessage) {
        match message {
            ReaderMessage::Card(payload) => match payload.into_read_event() {
                Ok(read) => {
                    self.budget.reset();
                    self.forward(read).await;
                }
                Err(e) => warn!(addr = %peer, error = %e, "Discarded card message"),
            },
            ReaderMessage::Error { message } => warn!(addr = %peer, message = %message, "Reader error"),
            ReaderMessage::Info { message } => info!(addr = %peer, message = %message, "Reader info"),
            ReaderMessage::Released => debug!(addr = %peer, "Card released"),
            ReaderMessage::Unknown => debug!(addr = %peer, "Ignored reader message of unknown type"),
        }
    }

    async fn forward(&mut self, read: ReadEvent) {
        if !*self.gate.borrow() {
            debug!(student = %read.student_number, "Read dropped: session not awaiting a read");
            return;
        }
        if self.events.send(TransportEvent::Read(read)).await.is_err() {
            debug!("Transport event receiver dropped");
        }
    }

    async fn on_process_exit(&mut self, exit: ExitReport) {
        warn!(exit = %exit, "Reader process exited");
        if self.connections.is_empty() {
            self.record_failure("process exited").await;
        }
    }

    async fn suspend(&mut self) {
        info!("Reader listener stopped by request");
        self.suspended = true;
        self.scheduled = None;
        self.stop_process().await;
        self.stop_listener().await;
    }

    async fn resume(&mut self) {
        if !self.suspended && self.listener.is_some() {
            return;
        }
        info!("Reader listener started by request");
        self.suspended = false;
        self.budget.reset();
        self.start_listener().await;
    }

    fn schedule(&mut self, delay: std::time::Duration, action: Scheduled) {
        self.scheduled = Some((Instant::now() + delay, action));
    }

    async fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == status {
            return;
        }
        info!(from = %self.status, to = %status, "Reader connection status");
        self.status = status;
        let _ = self.events.send(TransportEvent::Status(status)).await;
    }
}

async fn recv_listener(rx: &mut Option<mpsc::Receiver<ListenerEvent>>) -> Option<ListenerEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
