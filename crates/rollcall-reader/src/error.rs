//! Error types for reader process supervision.

use rollcall_network::ListenerError;

/// Result type for reader operations.
pub type Result<T> = std::result::Result<T, ReaderError>;

#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    /// The external reader program could not be started.
    #[error("Failed to spawn reader process `{program}`: {message}")]
    SpawnFailed { program: String, message: String },

    #[error("Reader process is not running")]
    NotRunning,

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The transport task has exited and no longer accepts commands.
    #[error("Reader transport stopped")]
    TransportStopped,

    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReaderError {
    pub fn spawn_failed(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            program: program.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
