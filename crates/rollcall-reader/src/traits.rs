//! Reader process abstraction.
//!
//! The card reader runs as a separate program that connects back to the
//! listener. The transport only needs to start it, stop it, and notice when
//! it exits, so that is all the trait exposes.
//!
//! Implementations use native `async fn` in traits. Like the rest of the
//! crate, dispatch goes through the concrete [`AnyReaderProcess`] enum
//! rather than trait objects, which keeps the futures `Send` for
//! `tokio::spawn`.
//!
//! [`AnyReaderProcess`]: crate::process::AnyReaderProcess

#![allow(async_fn_in_trait)]

use crate::error::Result;

/// How a reader process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    pub success: bool,
}

impl ExitReport {
    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            success: code == 0,
        }
    }

    /// Terminated without an exit code (signal, wait failure).
    pub fn abnormal() -> Self {
        Self {
            code: None,
            success: false,
        }
    }
}

impl std::fmt::Display for ExitReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "terminated abnormally"),
        }
    }
}

/// A supervised reader program.
pub trait ReaderProcess: Send {
    /// Launch the program. Launching while running replaces the old instance.
    async fn start(&mut self) -> Result<()>;

    /// Terminate the program. No-op when not running.
    async fn stop(&mut self) -> Result<()>;

    fn is_running(&self) -> bool;

    /// Resolve when the running program exits.
    ///
    /// Pending forever while nothing is running. Cancel safe.
    async fn wait_exit(&mut self) -> ExitReport;

    /// Human readable description for logs.
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ExitReport::with_code(0), Some(0), true, "exit code 0")]
    #[case(ExitReport::with_code(2), Some(2), false, "exit code 2")]
    #[case(ExitReport::abnormal(), None, false, "terminated abnormally")]
    fn test_exit_report(
        #[case] report: ExitReport,
        #[case] code: Option<i32>,
        #[case] success: bool,
        #[case] display: &str,
    ) {
        assert_eq!(report.code, code);
        assert_eq!(report.success, success);
        assert_eq!(report.to_string(), display);
    }
}
