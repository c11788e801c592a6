//! TCP listener for reader connections.
//!
//! The reader process connects as a client and writes JSON objects. Each
//! accepted connection gets its own task that decodes objects with
//! [`ReaderCodec`] and forwards them as [`ListenerEvent`]s. Per-message
//! decode failures are reported and the connection stays open; only a
//! transport error or EOF ends it.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐  accept  ┌─────────────────┐
//! │ accept task   │─────────>│ connection task │──┐
//! │ (JoinSet)     │          └─────────────────┘  │  ListenerEvent
//! │               │─────────>┌─────────────────┐  ├──────────────> mpsc
//! └───────────────┘          │ connection task │──┘
//!                            └─────────────────┘
//! ```
//!
//! Stopping the listener aborts the accept task, which drops the `JoinSet`
//! and aborts every connection task with it.

use futures::StreamExt;
use rollcall_core::constants::{
    DEFAULT_MAX_READER_CONNECTIONS, DEFAULT_READER_HOST, DEFAULT_READER_PORT,
};
use rollcall_protocol::{ParseError, ReaderCodec, ReaderMessage};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, trace, warn};

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to bind. Port 0 picks an ephemeral port.
    pub bind_addr: SocketAddr,

    /// Connections beyond this count are closed immediately.
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        let host = DEFAULT_READER_HOST
            .parse::<IpAddr>()
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        Self {
            bind_addr: SocketAddr::new(host, DEFAULT_READER_PORT),
            max_connections: DEFAULT_MAX_READER_CONNECTIONS,
        }
    }
}

/// Why a reader connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed the stream.
    Closed,
    /// The stream failed with a transport error.
    Error(String),
}

/// Event produced by the listener.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    Connected {
        peer: SocketAddr,
    },
    Message {
        peer: SocketAddr,
        message: ReaderMessage,
    },
    /// An object was received but could not be decoded; it was dropped.
    ParseFailed {
        peer: SocketAddr,
        error: ParseError,
    },
    Disconnected {
        peer: SocketAddr,
        reason: DisconnectReason,
    },
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Failed to bind to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A bound, not yet running, reader listener.
#[derive(Debug)]
pub struct ReaderListener {
    listener: TcpListener,
    config: ListenerConfig,
}

impl ReaderListener {
    /// Bind the listening socket.
    ///
    /// # Errors
    /// Returns `ListenerError::BindFailed` if the address is unavailable.
    pub async fn bind(config: ListenerConfig) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| ListenerError::BindFailed {
                addr: config.bind_addr,
                source,
            })?;

        info!(
            addr = %config.bind_addr,
            max_connections = config.max_connections,
            "Reader listener bound"
        );

        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ListenerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Start accepting connections, delivering events to `events`.
    ///
    /// The accept loop ends when the returned handle is stopped or dropped,
    /// or when the receiving side of `events` is closed.
    pub fn spawn(self, events: mpsc::Sender<ListenerEvent>) -> ListenerHandle {
        let local_addr = self
            .listener
            .local_addr()
            .unwrap_or(self.config.bind_addr);
        let task = tokio::spawn(accept_loop(self.listener, self.config, events));
        ListenerHandle { local_addr, task }
    }
}

/// Handle to a running listener.
#[derive(Debug)]
pub struct ListenerHandle {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and close every open connection. Idempotent.
    pub fn stop(&self) {
        if !self.task.is_finished() {
            info!(addr = %self.local_addr, "Stopping reader listener");
        }
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop and wait until the socket and every connection are closed.
    pub async fn shutdown(mut self) {
        self.stop();
        let _ = (&mut self.task).await;
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: ListenerConfig,
    events: mpsc::Sender<ListenerEvent>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept reader connection");
                        continue;
                    }
                };

                if connections.len() >= config.max_connections {
                    error!(
                        addr = %peer,
                        max_connections = config.max_connections,
                        "Connection rejected: maximum connections reached"
                    );
                    drop(stream);
                    continue;
                }

                if let Err(e) = stream.set_nodelay(true) {
                    warn!(addr = %peer, error = %e, "Failed to set TCP_NODELAY");
                }

                debug!(addr = %peer, total = connections.len() + 1, "Accepted reader connection");
                connections.spawn(serve_connection(stream, peer, events.clone()));
            }
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined
                    && e.is_panic()
                {
                    error!(error = %e, "Reader connection task panicked");
                }
            }
            _ = events.closed() => {
                debug!("Listener event receiver dropped, stopping accept loop");
                break;
            }
        }
    }
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, events: mpsc::Sender<ListenerEvent>) {
    info!(addr = %peer, "Reader connected");
    if events.send(ListenerEvent::Connected { peer }).await.is_err() {
        return;
    }

    let mut frames = FramedRead::new(stream, ReaderCodec::new());

    let reason = loop {
        let event = match frames.next().await {
            Some(Ok(Ok(message))) => {
                trace!(addr = %peer, kind = message.kind(), "Reader message");
                ListenerEvent::Message { peer, message }
            }
            Some(Ok(Err(error))) => {
                warn!(addr = %peer, error = %error, "Dropped undecodable reader message");
                ListenerEvent::ParseFailed { peer, error }
            }
            Some(Err(e)) => {
                error!(addr = %peer, error = %e, "Reader connection failed");
                break DisconnectReason::Error(e.to_string());
            }
            None => break DisconnectReason::Closed,
        };

        if events.send(event).await.is_err() {
            return;
        }
    };

    info!(addr = %peer, reason = ?reason, "Reader disconnected");
    let _ = events.send(ListenerEvent::Disconnected { peer, reason }).await;
}
