//! Per-job blackboard context passed through the stage sequence.
//!
//! The blackboard carries the original request description plus every prior
//! stage's output, so each capability sees the accumulated state of the job
//! without any shared global.

use parking_lot::RwLock;
use std::collections::HashMap;

/// The accumulated context handed to each stage capability.
///
/// Thread-safe via interior locking; designed to be wrapped in `Arc` and
/// owned by a single job's orchestration task.
#[derive(Debug)]
pub struct JobContext {
    /// The original request description.
    description: String,
    /// Per-stage outputs, keyed by stage name.
    outputs: RwLock<HashMap<String, serde_json::Value>>,
}

impl JobContext {
    /// Creates a new blackboard for a job.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            outputs: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the original request description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the recorded output of a prior stage, if any.
    #[must_use]
    pub fn output_of(&self, stage_name: &str) -> Option<serde_json::Value> {
        self.outputs.read().get(stage_name).cloned()
    }

    /// Records a stage's output on the blackboard.
    ///
    /// The sequential pipeline visits each stage once, so a second write for
    /// the same stage replaces the first (retry attempts overwrite).
    pub fn record_output(&self, stage_name: impl Into<String>, output: serde_json::Value) {
        self.outputs.write().insert(stage_name.into(), output);
    }

    /// Returns the names of stages that have recorded output.
    #[must_use]
    pub fn recorded_stages(&self) -> Vec<String> {
        self.outputs.read().keys().cloned().collect()
    }

    /// Returns a copy of all recorded outputs.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        self.outputs.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_available() {
        let ctx = JobContext::new("build X");
        assert_eq!(ctx.description(), "build X");
    }

    #[test]
    fn test_record_and_read_output() {
        let ctx = JobContext::new("build X");
        assert!(ctx.output_of("plan").is_none());

        ctx.record_output("plan", serde_json::json!({"steps": 3}));
        assert_eq!(
            ctx.output_of("plan"),
            Some(serde_json::json!({"steps": 3}))
        );
    }

    #[test]
    fn test_rewrite_replaces() {
        let ctx = JobContext::new("build X");
        ctx.record_output("plan", serde_json::json!(1));
        ctx.record_output("plan", serde_json::json!(2));
        assert_eq!(ctx.output_of("plan"), Some(serde_json::json!(2)));
        assert_eq!(ctx.recorded_stages(), vec!["plan".to_string()]);
    }
}
