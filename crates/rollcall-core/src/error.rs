use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Wire format errors
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    #[error("Frame too large: {size} bytes (max {max_size})")]
    FrameTooLarge { size: usize, max_size: usize },

    // Domain value errors
    #[error("Invalid student number: {0}")]
    InvalidStudentNumber(String),

    #[error("Invalid attendance mode: {0}")]
    InvalidMode(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
