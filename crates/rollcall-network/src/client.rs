//! TCP client that plays the reader side of the link.
//!
//! The real reader process is an external program; this client writes the
//! same wire format so the coordinator can be driven without hardware.

use futures::SinkExt;
use rollcall_core::constants::DEFAULT_READER_PORT;
use rollcall_protocol::{ReaderCodec, ReaderMessage};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone)]
pub struct ReaderClientConfig {
    /// Listener address to connect to.
    pub server_addr: SocketAddr,

    /// Applied to connect and to each write.
    pub timeout: Duration,
}

impl Default for ReaderClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_READER_PORT)),
            timeout: Duration::from_millis(3000),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReaderClientError {
    #[error("Not connected to listener")]
    NotConnected,

    #[error("Connection timeout after {0}ms")]
    ConnectionTimeout(u64),

    #[error("Write timeout after {0}ms")]
    WriteTimeout(u64),

    #[error("Protocol error: {0}")]
    Protocol(#[from] rollcall_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct ReaderClient {
    server_addr: SocketAddr,
    framed: Option<Framed<TcpStream, ReaderCodec>>,
    timeout: Duration,
}

impl ReaderClient {
    pub fn new(config: ReaderClientConfig) -> Self {
        Self {
            server_addr: config.server_addr,
            framed: None,
            timeout: config.timeout,
        }
    }

    pub async fn connect(&mut self) -> Result<(), ReaderClientError> {
        info!(addr = %self.server_addr, "Connecting to reader listener");

        let stream =
            match tokio::time::timeout(self.timeout, TcpStream::connect(self.server_addr)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    error!(addr = %self.server_addr, error = %e, "Connection failed");
                    return Err(e.into());
                }
                Err(_) => {
                    warn!("Connection timeout after {}ms", self.timeout.as_millis());
                    return Err(ReaderClientError::ConnectionTimeout(
                        self.timeout.as_millis() as u64,
                    ));
                }
            };

        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "Failed to set TCP_NODELAY");
        }

        self.framed = Some(Framed::new(stream, ReaderCodec::new()));
        debug!("Reader client connected");
        Ok(())
    }

    /// Write one message, newline-terminated.
    pub async fn send(&mut self, message: ReaderMessage) -> Result<(), ReaderClientError> {
        trace!(kind = message.kind(), "Sending reader message");
        let framed = self.framed.as_mut().ok_or(ReaderClientError::NotConnected)?;

        match tokio::time::timeout(self.timeout, framed.send(message)).await {
            Ok(result) => result.map_err(ReaderClientError::Protocol),
            Err(_) => Err(ReaderClientError::WriteTimeout(self.timeout.as_millis() as u64)),
        }
    }

    /// Write raw bytes, bypassing the encoder.
    ///
    /// Useful for exercising the listener with split or malformed input.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ReaderClientError> {
        let framed = self.framed.as_mut().ok_or(ReaderClientError::NotConnected)?;
        let stream = framed.get_mut();

        let write = async {
            stream.write_all(bytes).await?;
            stream.flush().await
        };
        match tokio::time::timeout(self.timeout, write).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ReaderClientError::WriteTimeout(self.timeout.as_millis() as u64)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    /// Flush and shut down the write side. No-op when not connected.
    pub async fn close(&mut self) -> Result<(), ReaderClientError> {
        let Some(mut framed) = self.framed.take() else {
            return Ok(());
        };
        info!(addr = %self.server_addr, "Closing reader connection");

        let grace = Duration::from_millis(500);
        if let Ok(Err(e)) = tokio::time::timeout(grace, framed.flush()).await {
            warn!(error = %e, "Error flushing during close");
        }

        let mut stream = framed.into_inner();
        match tokio::time::timeout(grace, stream.shutdown()).await {
            Ok(Ok(())) => debug!("Shutdown completed"),
            Ok(Err(e)) => warn!(error = %e, "Error during shutdown"),
            Err(_) => warn!("Shutdown timeout during close ({}ms)", grace.as_millis()),
        }
        Ok(())
    }
}
