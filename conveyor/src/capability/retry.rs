//! Stage-local retry with bounded exponential backoff.
//!
//! Retry is an opt-in wrapper around a capability, invisible to the
//! orchestrator's sequencing contract. The orchestrator itself never
//! retries a failed stage.

use super::{ProgressReporter, StageCapability, StageOutcome};
use crate::context::JobContext;
use crate::errors::Result;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Configuration for stage-local retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the initial one.
    pub max_attempts: usize,
    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,
    /// Cap on the computed delay in milliseconds.
    pub max_delay_ms: u64,
    /// Whether to apply full jitter (random delay in `[0, computed]`).
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Disables jitter, producing deterministic delays.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Computes the delay before the next attempt.
    ///
    /// `attempt` is 0-indexed: the delay after the first failure uses
    /// `attempt = 0`. The exponential delay is capped, then jittered.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let capped = exp.min(self.max_delay_ms);
        let delayed = if self.jitter && capped > 0 {
            rand::thread_rng().gen_range(0..=capped)
        } else {
            capped
        };
        Duration::from_millis(delayed)
    }
}

/// Wraps a capability with a bounded retry-with-backoff policy.
#[derive(Debug)]
pub struct RetryCapability {
    inner: Arc<dyn StageCapability>,
    policy: RetryPolicy,
}

impl RetryCapability {
    /// Wraps the given capability with a retry policy.
    #[must_use]
    pub fn new(inner: Arc<dyn StageCapability>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl StageCapability for RetryCapability {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn invoke(
        &self,
        ctx: Arc<JobContext>,
        reporter: ProgressReporter,
    ) -> Result<StageOutcome> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_err = None;

        for attempt in 0..attempts {
            match self.inner.invoke(ctx.clone(), reporter.clone()).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) => {
                    let remaining = attempts - attempt - 1;
                    if remaining > 0 {
                        let delay = self.policy.delay_for_attempt(attempt as u32);
                        warn!(
                            stage = %self.inner.name(),
                            attempt = attempt + 1,
                            remaining,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Stage attempt failed, retrying after backoff"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_err = Some(err);
                }
            }
        }

        // attempts >= 1, so last_err is set when we get here.
        Err(last_err.unwrap_or_else(|| {
            crate::errors::ConveyorError::stage_execution(self.inner.name(), "no attempts made")
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::FnCapability;
    use crate::errors::ConveyorError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_delay_is_exponential_and_capped() {
        let policy = RetryPolicy::new()
            .with_base_delay_ms(1000)
            .with_max_delay_ms(4000)
            .without_jitter();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(4000));
    }

    #[test]
    fn test_jittered_delay_within_bounds() {
        let policy = RetryPolicy::new().with_base_delay_ms(100).with_max_delay_ms(800);
        for attempt in 0..5 {
            let delay = policy.delay_for_attempt(attempt);
            assert!(delay <= Duration::from_millis(800));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let inner = Arc::new(FnCapability::new("flaky", move |_ctx, _reporter| {
            let calls = calls_clone.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ConveyorError::stage_execution("flaky", "transient"))
                } else {
                    Ok(StageOutcome::empty())
                }
            }
        }));

        let wrapped = RetryCapability::new(
            inner,
            RetryPolicy::new().with_max_attempts(3).without_jitter(),
        );

        let ctx = Arc::new(JobContext::new("test"));
        let result = wrapped.invoke(ctx, ProgressReporter::disabled()).await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_surfaces_last_error() {
        let inner = Arc::new(FnCapability::new("doomed", |_ctx, _reporter| async {
            Err::<StageOutcome, _>(ConveyorError::stage_execution("doomed", "always fails"))
        }));

        let wrapped = RetryCapability::new(
            inner,
            RetryPolicy::new().with_max_attempts(2).without_jitter(),
        );

        let ctx = Arc::new(JobContext::new("test"));
        let err = wrapped
            .invoke(ctx, ProgressReporter::disabled())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("always fails"));
    }
}
