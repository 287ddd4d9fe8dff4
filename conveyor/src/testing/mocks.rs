//! Mock capabilities and fault-injecting transports.

use crate::broadcast::JobSnapshot;
use crate::capability::{ProgressReporter, StageCapability, StageOutcome};
use crate::client::{ChannelTransport, MessageStream};
use crate::context::JobContext;
use crate::core::{Artifact, ChannelMessage, JobId};
use crate::errors::{ConveyorError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A capability that succeeds with a configured outcome, optionally
/// reporting intermediate progress.
#[derive(Debug)]
pub struct SuccessCapability {
    name: String,
    data: serde_json::Value,
    artifacts: Vec<Artifact>,
    progress_steps: Vec<u8>,
}

impl SuccessCapability {
    /// Creates a capability that succeeds with an empty outcome.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: serde_json::Value::Null,
            artifacts: Vec::new(),
            progress_steps: Vec::new(),
        }
    }

    /// Sets the blackboard data the capability produces.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Adds an artifact to produce.
    #[must_use]
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Reports the given progress percentages, in order, before finishing.
    #[must_use]
    pub fn with_progress_steps(mut self, steps: Vec<u8>) -> Self {
        self.progress_steps = steps;
        self
    }
}

#[async_trait]
impl StageCapability for SuccessCapability {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        _ctx: Arc<JobContext>,
        reporter: ProgressReporter,
    ) -> Result<StageOutcome> {
        for step in &self.progress_steps {
            reporter.progress(*step);
            tokio::task::yield_now().await;
        }
        let mut outcome = StageOutcome::with_data(self.data.clone());
        outcome.artifacts = self.artifacts.clone();
        Ok(outcome)
    }
}

/// A capability that always fails with a stage execution error.
#[derive(Debug)]
pub struct FailingCapability {
    name: String,
    message: String,
}

impl FailingCapability {
    /// Creates a capability failing with the given message.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl StageCapability for FailingCapability {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        _ctx: Arc<JobContext>,
        _reporter: ProgressReporter,
    ) -> Result<StageOutcome> {
        Err(ConveyorError::stage_execution(&self.name, &self.message))
    }
}

/// A capability that sleeps before succeeding, for deadline tests.
#[derive(Debug)]
pub struct SlowCapability {
    name: String,
    delay: Duration,
}

impl SlowCapability {
    /// Creates a capability that sleeps for `delay` before succeeding.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
        }
    }
}

#[async_trait]
impl StageCapability for SlowCapability {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        _ctx: Arc<JobContext>,
        _reporter: ProgressReporter,
    ) -> Result<StageOutcome> {
        tokio::time::sleep(self.delay).await;
        Ok(StageOutcome::empty())
    }
}

/// A capability that records every invocation's blackboard view.
#[derive(Debug, Default)]
pub struct RecordingCapability {
    name: String,
    invocations: Mutex<Vec<Vec<String>>>,
}

impl RecordingCapability {
    /// Creates a recording capability.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Returns the recorded prior-stage names seen at each invocation.
    #[must_use]
    pub fn invocations(&self) -> Vec<Vec<String>> {
        self.invocations.lock().clone()
    }
}

#[async_trait]
impl StageCapability for RecordingCapability {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        ctx: Arc<JobContext>,
        _reporter: ProgressReporter,
    ) -> Result<StageOutcome> {
        let mut seen = ctx.recorded_stages();
        seen.sort();
        self.invocations.lock().push(seen);
        Ok(StageOutcome::empty())
    }
}

/// A transport wrapper that injects connect failures and mid-stream cuts.
pub struct FlakyTransport {
    inner: Arc<dyn ChannelTransport>,
    fail_next_connects: AtomicU32,
    cut_next_stream_after: AtomicUsize,
    connect_attempts: AtomicU32,
}

impl FlakyTransport {
    /// Wraps a transport with no faults armed.
    #[must_use]
    pub fn new(inner: Arc<dyn ChannelTransport>) -> Self {
        Self {
            inner,
            fail_next_connects: AtomicU32::new(0),
            cut_next_stream_after: AtomicUsize::new(usize::MAX),
            connect_attempts: AtomicU32::new(0),
        }
    }

    /// Makes the next `n` connect calls fail with a channel error.
    pub fn fail_next_connects(&self, n: u32) {
        self.fail_next_connects.store(n, Ordering::SeqCst);
    }

    /// Makes the next established stream fail after `n` messages.
    pub fn cut_next_stream_after(&self, n: usize) {
        self.cut_next_stream_after.store(n, Ordering::SeqCst);
    }

    /// Returns the total number of connect calls observed.
    #[must_use]
    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }
}

struct CutStream {
    inner: Box<dyn MessageStream>,
    remaining: usize,
}

#[async_trait]
impl MessageStream for CutStream {
    async fn next_message(&mut self) -> Result<Option<ChannelMessage>> {
        if self.remaining == 0 {
            return Err(ConveyorError::Channel("connection reset".into()));
        }
        self.remaining -= 1;
        self.inner.next_message().await
    }
}

#[async_trait]
impl ChannelTransport for FlakyTransport {
    async fn connect(&self, job_id: JobId) -> Result<(JobSnapshot, Box<dyn MessageStream>)> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let remaining = self.fail_next_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next_connects.store(remaining - 1, Ordering::SeqCst);
            return Err(ConveyorError::Channel("connection refused".into()));
        }

        let (snapshot, stream) = self.inner.connect(job_id).await?;
        let cut = self
            .cut_next_stream_after
            .swap(usize::MAX, Ordering::SeqCst);
        if cut == usize::MAX {
            Ok((snapshot, stream))
        } else {
            Ok((
                snapshot,
                Box::new(CutStream {
                    inner: stream,
                    remaining: cut,
                }),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::ProgressBroadcaster;
    use crate::client::LocalTransport;
    use crate::core::Job;
    use crate::store::JobStateStore;
    use crate::utils;

    #[tokio::test]
    async fn test_failing_capability() {
        let cap = FailingCapability::new("plan", "boom");
        let ctx = Arc::new(JobContext::new("x"));
        let err = cap
            .invoke(ctx, ProgressReporter::disabled())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_flaky_transport_connect_failures() {
        let store = Arc::new(JobStateStore::new());
        let job = Job::new(utils::generate_uuid(), "x", vec!["plan".into()], utils::now());
        let job_id = job.id;
        store.insert(job);
        let broadcaster = Arc::new(ProgressBroadcaster::new(store, 8));

        let flaky = FlakyTransport::new(Arc::new(LocalTransport::new(broadcaster)));
        flaky.fail_next_connects(2);

        assert!(flaky.connect(job_id).await.is_err());
        assert!(flaky.connect(job_id).await.is_err());
        assert!(flaky.connect(job_id).await.is_ok());
        assert_eq!(flaky.connect_attempts(), 3);
    }
}
