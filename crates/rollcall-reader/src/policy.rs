//! Restart policy for the reader process.
//!
//! Up to `max_restarts` failures each restart the process after the retry
//! interval. The next failure escalates to a listener restart instead,
//! after which the budget starts over.

use std::time::Duration;

use rollcall_core::constants::{
    DEFAULT_LAUNCH_DELAY_MS, DEFAULT_MAX_RESTARTS, DEFAULT_RETRY_INTERVAL_MS,
    DEFAULT_SETTLE_DELAY_MS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Process restarts allowed before a failure escalates.
    pub max_restarts: u32,
    /// Delay before restarting the process after a failure.
    pub retry_interval: Duration,
    /// Delay between binding the listener and launching the process.
    pub launch_delay: Duration,
    /// Delay between binding the listener and reporting it as listening.
    pub settle_delay: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: DEFAULT_MAX_RESTARTS,
            retry_interval: Duration::from_millis(DEFAULT_RETRY_INTERVAL_MS),
            launch_delay: Duration::from_millis(DEFAULT_LAUNCH_DELAY_MS),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
        }
    }
}

/// What to do about a counted failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Restart the process; `attempt` counts from 1.
    RestartProcess { attempt: u32 },
    /// Budget exhausted: tear down and rebind the listener.
    RestartListener,
}

#[derive(Debug, Clone)]
pub struct RestartBudget {
    failures: u32,
    max_restarts: u32,
}

impl RestartBudget {
    pub fn new(policy: &RestartPolicy) -> Self {
        Self {
            failures: 0,
            max_restarts: policy.max_restarts.max(1),
        }
    }

    pub fn record_failure(&mut self) -> RestartDecision {
        self.failures = self.failures.saturating_add(1);
        if self.failures > self.max_restarts {
            RestartDecision::RestartListener
        } else {
            RestartDecision::RestartProcess {
                attempt: self.failures,
            }
        }
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn max_restarts(&self) -> u32 {
        self.max_restarts
    }
}
