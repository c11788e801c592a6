//! Channel-driven mock of the external reader program.
//!
//! Tests hold a [`MockProcessHandle`] to make the "program" exit or refuse to
//! launch, and to count how often the supervisor launched it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::mpsc;

use crate::error::{ReaderError, Result};
use crate::traits::{ExitReport, ReaderProcess};

#[derive(Debug, Default)]
struct Shared {
    launches: AtomicUsize,
    stops: AtomicUsize,
    failing_spawns: AtomicUsize,
    fail_always: AtomicBool,
}

#[derive(Debug)]
pub struct MockProcess {
    exit_rx: mpsc::Receiver<ExitReport>,
    shared: Arc<Shared>,
    running: bool,
}

impl MockProcess {
    pub fn new() -> (Self, MockProcessHandle) {
        let (exit_tx, exit_rx) = mpsc::channel(8);
        let shared = Arc::new(Shared::default());

        let process = Self {
            exit_rx,
            shared: Arc::clone(&shared),
            running: false,
        };
        (process, MockProcessHandle { exit_tx, shared })
    }

    fn take_spawn_failure(&self) -> bool {
        if self.shared.fail_always.load(Ordering::SeqCst) {
            return true;
        }
        self.shared
            .failing_spawns
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl ReaderProcess for MockProcess {
    async fn start(&mut self) -> Result<()> {
        self.shared.launches.fetch_add(1, Ordering::SeqCst);

        if self.take_spawn_failure() {
            self.running = false;
            return Err(ReaderError::spawn_failed("mock-reader", "spawn refused"));
        }

        // Exits queued for a previous instance do not apply to this one.
        while self.exit_rx.try_recv().is_ok() {}
        self.running = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if self.running {
            self.shared.stops.fetch_add(1, Ordering::SeqCst);
            self.running = false;
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    async fn wait_exit(&mut self) -> ExitReport {
        if !self.running {
            return std::future::pending().await;
        }
        match self.exit_rx.recv().await {
            Some(report) => {
                self.running = false;
                report
            }
            None => std::future::pending().await,
        }
    }

    fn describe(&self) -> String {
        "mock-reader".to_string()
    }
}

/// Test-side control of a [`MockProcess`].
#[derive(Debug, Clone)]
pub struct MockProcessHandle {
    exit_tx: mpsc::Sender<ExitReport>,
    shared: Arc<Shared>,
}

impl MockProcessHandle {
    /// Make the running instance exit with `code`.
    pub async fn exit(&self, code: i32) {
        let _ = self.exit_tx.send(ExitReport::with_code(code)).await;
    }

    /// Refuse the next `count` launches.
    pub fn fail_next_spawns(&self, count: usize) {
        self.shared.failing_spawns.store(count, Ordering::SeqCst);
    }

    /// Refuse every launch until switched off.
    pub fn fail_all_spawns(&self, fail: bool) {
        self.shared.fail_always.store(fail, Ordering::SeqCst);
    }

    /// Launch attempts so far, failed ones included.
    pub fn launch_count(&self) -> usize {
        self.shared.launches.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.shared.stops.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_and_exit() {
        let (mut process, handle) = MockProcess::new();
        process.start().await.unwrap();
        assert!(process.is_running());

        handle.exit(2).await;
        let report = process.wait_exit().await;
        assert_eq!(report.code, Some(2));
        assert!(!report.success);
        assert!(!process.is_running());
    }

    #[tokio::test]
    async fn test_fail_next_spawns() {
        let (mut process, handle) = MockProcess::new();
        handle.fail_next_spawns(2);

        assert!(process.start().await.is_err());
        assert!(process.start().await.is_err());
        assert!(process.start().await.is_ok());
        assert_eq!(handle.launch_count(), 3);
    }

    #[tokio::test]
    async fn test_fail_all_spawns() {
        let (mut process, handle) = MockProcess::new();
        handle.fail_all_spawns(true);
        for _ in 0..3 {
            assert!(process.start().await.is_err());
        }
        handle.fail_all_spawns(false);
        assert!(process.start().await.is_ok());
    }

    #[tokio::test]
    async fn test_stale_exit_discarded_on_restart() {
        let (mut process, handle) = MockProcess::new();
        process.start().await.unwrap();
        handle.exit(1).await;
        process.stop().await.unwrap();
        assert_eq!(handle.stop_count(), 1);

        process.start().await.unwrap();
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(20), process.wait_exit()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_exit_pending_when_stopped() {
        let (mut process, _handle) = MockProcess::new();
        let waited =
            tokio::time::timeout(std::time::Duration::from_secs(1), process.wait_exit()).await;
        assert!(waited.is_err());
    }
}
