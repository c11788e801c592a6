//! Reader process implementations and enum dispatch.

use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::{ReaderError, Result};
use crate::mock::MockProcess;
use crate::traits::{ExitReport, ReaderProcess};

/// External reader program launched from an argv.
///
/// The child is spawned with `kill_on_drop`, so dropping the supervisor
/// never leaves an orphaned reader behind.
#[derive(Debug)]
pub struct CommandProcess {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
}

impl CommandProcess {
    /// # Errors
    /// Returns `ReaderError::Configuration` if `argv` is empty.
    pub fn new(argv: Vec<String>) -> Result<Self> {
        let mut parts = argv.into_iter();
        let program = parts
            .next()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ReaderError::configuration("reader command is empty"))?;

        Ok(Self {
            program,
            args: parts.collect(),
            child: None,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }
}

impl ReaderProcess for CommandProcess {
    async fn start(&mut self) -> Result<()> {
        self.stop().await?;

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ReaderError::spawn_failed(&self.program, e.to_string()))?;

        info!(program = %self.program, pid = ?child.id(), "Reader process started");
        self.child = Some(child);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        debug!(program = %self.program, pid = ?child.id(), "Stopping reader process");
        if let Err(e) = child.kill().await {
            warn!(program = %self.program, error = %e, "Failed to kill reader process");
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.child.is_some()
    }

    async fn wait_exit(&mut self) -> ExitReport {
        let Some(child) = self.child.as_mut() else {
            return std::future::pending().await;
        };

        let report = match child.wait().await {
            Ok(status) => status.code().map_or_else(ExitReport::abnormal, ExitReport::with_code),
            Err(e) => {
                warn!(program = %self.program, error = %e, "Failed to wait for reader process");
                ExitReport::abnormal()
            }
        };
        self.child = None;
        report
    }

    fn describe(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Enum dispatch over every reader process kind.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyReaderProcess {
    Command(CommandProcess),
    Mock(MockProcess),
    /// The reader is managed outside the coordinator. Only the listener is
    /// supervised.
    Detached,
}

impl ReaderProcess for AnyReaderProcess {
    async fn start(&mut self) -> Result<()> {
        match self {
            Self::Command(process) => process.start().await,
            Self::Mock(process) => process.start().await,
            Self::Detached => Ok(()),
        }
    }

    async fn stop(&mut self) -> Result<()> {
        match self {
            Self::Command(process) => process.stop().await,
            Self::Mock(process) => process.stop().await,
            Self::Detached => Ok(()),
        }
    }

    fn is_running(&self) -> bool {
        match self {
            Self::Command(process) => process.is_running(),
            Self::Mock(process) => process.is_running(),
            Self::Detached => false,
        }
    }

    async fn wait_exit(&mut self) -> ExitReport {
        match self {
            Self::Command(process) => process.wait_exit().await,
            Self::Mock(process) => process.wait_exit().await,
            Self::Detached => std::future::pending().await,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Command(process) => process.describe(),
            Self::Mock(process) => process.describe(),
            Self::Detached => "detached".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_process_requires_program() {
        assert!(matches!(
            CommandProcess::new(vec![]),
            Err(ReaderError::Configuration { .. })
        ));
        assert!(CommandProcess::new(vec!["  ".to_string()]).is_err());
    }

    #[test]
    fn test_command_process_describe() {
        let process =
            CommandProcess::new(vec!["python3".into(), "reader.py".into(), "--port".into()])
                .unwrap();
        assert_eq!(process.program(), "python3");
        assert_eq!(process.describe(), "python3 reader.py --port");
        assert!(!process.is_running());
    }

    #[tokio::test]
    async fn test_spawn_missing_program_fails() {
        let mut process =
            CommandProcess::new(vec!["/nonexistent/rollcall-reader-binary".into()]).unwrap();
        let err = process.start().await.unwrap_err();
        assert!(matches!(err, ReaderError::SpawnFailed { .. }));
        assert!(!process.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_exit_reports_code() {
        let mut process =
            CommandProcess::new(vec!["sh".into(), "-c".into(), "exit 3".into()]).unwrap();
        process.start().await.unwrap();
        assert!(process.is_running());

        let report = process.wait_exit().await;
        assert_eq!(report, ExitReport::with_code(3));
        assert!(!process.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_kills_running_process() {
        let mut process =
            CommandProcess::new(vec!["sleep".into(), "30".into()]).unwrap();
        process.start().await.unwrap();
        assert!(process.pid().is_some());

        process.stop().await.unwrap();
        assert!(!process.is_running());
        process.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_any_reader_process_detached() {
        let mut process = AnyReaderProcess::Detached;
        process.start().await.unwrap();
        assert!(!process.is_running());
        assert_eq!(process.describe(), "detached");
    }

    #[tokio::test]
    async fn test_any_reader_process_mock() {
        let (mock, handle) = MockProcess::new();
        let mut process = AnyReaderProcess::Mock(mock);

        process.start().await.unwrap();
        assert!(process.is_running());
        assert_eq!(handle.launch_count(), 1);
    }
}
