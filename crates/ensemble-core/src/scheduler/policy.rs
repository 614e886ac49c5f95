//! Bounded retry and concurrency policy for the scheduler.

use std::time::Duration;

/// Knobs governing a collaboration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerPolicy {
    /// Retries after the first attempt; a task consumes at most
    /// `max_retries + 1` invocations.
    pub max_retries: u32,
    /// First backoff delay; doubles per failed attempt.
    pub base_backoff: Duration,
    /// Upper bound on a single worker invocation. Exceeding it is a
    /// retryable failure, not a fatal abort.
    pub invoke_timeout: Duration,
    /// Maximum concurrent invocations within a wave.
    pub max_concurrent: usize,
    /// Consecutive failures after which a worker is marked unavailable.
    pub worker_failure_threshold: u32,
}

impl Default for SchedulerPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_backoff: Duration::from_millis(250),
            invoke_timeout: Duration::from_secs(30),
            max_concurrent: 4,
            worker_failure_threshold: 3,
        }
    }
}

impl SchedulerPolicy {
    /// Backoff before retry number `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}
