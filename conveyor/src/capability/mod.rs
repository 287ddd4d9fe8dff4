//! Stage capabilities: the units of work invoked by the orchestrator.
//!
//! A capability consumes the accumulated job blackboard and produces data
//! for later stages plus zero or more artifacts. What happens inside a
//! capability is opaque to the orchestration core; the registry selects
//! capabilities by stage name, so a fixed stage sequence like
//! `["plan", "generate", "review", "organize", "validate"]` fully determines
//! the pipeline.

mod registry;
mod reporter;
mod retry;

pub use registry::CapabilityRegistry;
pub use reporter::{ProgressReporter, ProgressUpdate};
pub use retry::{RetryCapability, RetryPolicy};

use crate::context::JobContext;
use crate::core::Artifact;
use crate::errors::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

/// The successful result of one capability invocation.
#[derive(Debug, Clone, Default)]
pub struct StageOutcome {
    /// Output data recorded on the blackboard for later stages.
    pub data: serde_json::Value,
    /// Artifacts produced by this stage.
    pub artifacts: Vec<Artifact>,
}

impl StageOutcome {
    /// Creates an empty successful outcome.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates an outcome carrying blackboard data.
    #[must_use]
    pub fn with_data(data: serde_json::Value) -> Self {
        Self {
            data,
            artifacts: Vec::new(),
        }
    }

    /// Adds an artifact to the outcome.
    #[must_use]
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }
}

/// Trait for stage capabilities.
///
/// Implementations may report live progress through the [`ProgressReporter`]
/// while running; the orchestrator turns those reports into store updates
/// and push deltas. The reporter is moved into the invocation so that
/// dropping it marks the end of the stage's progress stream.
#[async_trait]
pub trait StageCapability: Send + Sync + Debug {
    /// Returns the stage name this capability serves.
    fn name(&self) -> &str;

    /// Executes the capability against the accumulated job context.
    ///
    /// # Errors
    ///
    /// Returns `ConveyorError::StageExecution` (or any other error the
    /// implementation maps into it) on failure; the orchestrator stops the
    /// pipeline at this stage.
    async fn invoke(
        &self,
        ctx: Arc<JobContext>,
        reporter: ProgressReporter,
    ) -> Result<StageOutcome>;
}

/// An async function-based capability.
pub struct FnCapability<F> {
    name: String,
    func: F,
}

impl<F> FnCapability<F> {
    /// Creates a new function-based capability.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnCapability<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnCapability")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<F, Fut> StageCapability for FnCapability<F>
where
    F: Fn(Arc<JobContext>, ProgressReporter) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StageOutcome>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        ctx: Arc<JobContext>,
        reporter: ProgressReporter,
    ) -> Result<StageOutcome> {
        (self.func)(ctx, reporter).await
    }
}

/// A no-op capability that succeeds immediately with an empty outcome.
#[derive(Debug, Clone)]
pub struct NoOpCapability {
    name: String,
}

impl NoOpCapability {
    /// Creates a new no-op capability.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl StageCapability for NoOpCapability {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        _ctx: Arc<JobContext>,
        _reporter: ProgressReporter,
    ) -> Result<StageOutcome> {
        Ok(StageOutcome::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Artifact;

    #[test]
    fn test_outcome_builders() {
        let outcome = StageOutcome::with_data(serde_json::json!({"plan": "do it"}))
            .with_artifact(Artifact::inline("plan.md", "# Plan", "plan"));
        assert_eq!(outcome.artifacts.len(), 1);
        assert_eq!(outcome.data["plan"], "do it");
    }

    #[tokio::test]
    async fn test_noop_capability() {
        let cap = NoOpCapability::new("plan");
        assert_eq!(cap.name(), "plan");

        let ctx = Arc::new(JobContext::new("test"));
        let outcome = cap
            .invoke(ctx, ProgressReporter::disabled())
            .await
            .unwrap();
        assert!(outcome.artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_fn_capability() {
        let cap = FnCapability::new("plan", |ctx: Arc<JobContext>, _reporter| async move {
            Ok(StageOutcome::with_data(serde_json::json!({
                "request": ctx.description(),
            })))
        });

        let ctx = Arc::new(JobContext::new("build X"));
        let outcome = cap
            .invoke(ctx, ProgressReporter::disabled())
            .await
            .unwrap();
        assert_eq!(outcome.data["request"], "build X");
    }
}
