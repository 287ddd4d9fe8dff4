//! Configuration for the orchestrator and the channel client.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for [`crate::orchestrator::JobOrchestrator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum number of stage invocations running concurrently across all
    /// jobs (the worker budget).
    pub worker_budget: usize,
    /// Deadline for a single stage invocation, in milliseconds. Exceeding it
    /// fails the stage with a timeout error.
    pub stage_deadline_ms: u64,
    /// Capacity of each subscriber's event queue.
    pub subscriber_queue_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_budget: 4,
            stage_deadline_ms: 300_000,
            subscriber_queue_capacity: 64,
        }
    }
}

impl OrchestratorConfig {
    /// Creates a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker budget.
    #[must_use]
    pub fn with_worker_budget(mut self, budget: usize) -> Self {
        self.worker_budget = budget;
        self
    }

    /// Sets the per-stage deadline.
    #[must_use]
    pub fn with_stage_deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.stage_deadline_ms = deadline_ms;
        self
    }

    /// Sets the subscriber queue capacity.
    #[must_use]
    pub fn with_subscriber_queue_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_queue_capacity = capacity;
        self
    }

    /// Returns the stage deadline as a [`Duration`].
    #[must_use]
    pub fn stage_deadline(&self) -> Duration {
        Duration::from_millis(self.stage_deadline_ms)
    }
}

/// Configuration for [`crate::client::ChannelClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base reconnect delay in milliseconds; doubled per failed attempt.
    pub backoff_base_ms: u64,
    /// Cap on the reconnect delay in milliseconds.
    pub backoff_cap_ms: u64,
    /// Reconnect attempts before switching to polling fallback.
    pub max_reconnect_attempts: u32,
    /// Interval between fallback polls in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: 1000,
            backoff_cap_ms: 30_000,
            max_reconnect_attempts: 5,
            poll_interval_ms: 2000,
        }
    }
}

impl ClientConfig {
    /// Creates a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the backoff base delay.
    #[must_use]
    pub fn with_backoff_base_ms(mut self, base_ms: u64) -> Self {
        self.backoff_base_ms = base_ms;
        self
    }

    /// Sets the backoff cap.
    #[must_use]
    pub fn with_backoff_cap_ms(mut self, cap_ms: u64) -> Self {
        self.backoff_cap_ms = cap_ms;
        self
    }

    /// Sets the reconnect attempt limit.
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the fallback poll interval.
    #[must_use]
    pub fn with_poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.poll_interval_ms = interval_ms;
        self
    }

    /// Computes the reconnect delay for a 0-indexed attempt:
    /// `min(base * 2^attempt, cap)`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .backoff_base_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(exp.min(self.backoff_cap_ms))
    }

    /// Returns the poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
