//! Error types for the conveyor orchestration framework.
//!
//! The taxonomy follows the propagation policy of the system design:
//! validation failures are rejected synchronously before any state exists,
//! stage and timeout failures abort the owning job, channel failures are
//! recovered entirely inside the client layer, and persistence failures are
//! fatal for the affected job.

use thiserror::Error;

/// The main error type for conveyor operations.
#[derive(Debug, Error)]
pub enum ConveyorError {
    /// A malformed creation request was rejected before a job was created.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A stage capability failed; the pipeline aborts from that stage.
    #[error("Stage '{stage}' failed: {message}")]
    StageExecution {
        /// The stage that failed.
        stage: String,
        /// Description of the failure.
        message: String,
    },

    /// A stage exceeded its deadline; handled like a stage failure.
    #[error("Stage '{stage}' timed out after {deadline_ms}ms")]
    Timeout {
        /// The stage that timed out.
        stage: String,
        /// The deadline that was exceeded, in milliseconds.
        deadline_ms: u64,
    },

    /// Transport-level failure of the push channel.
    ///
    /// Never surfaced as a job failure; the channel client recovers via
    /// reconnect, backoff, and poll fallback.
    #[error("Channel error: {0}")]
    Channel(String),

    /// A job state store write failed; fatal for that job.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The job was cancelled cooperatively.
    #[error("Job cancelled: {0}")]
    Cancelled(String),
}

impl ConveyorError {
    /// Creates a stage execution error.
    #[must_use]
    pub fn stage_execution(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StageExecution {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Creates a stage timeout error.
    #[must_use]
    pub fn timeout(stage: impl Into<String>, deadline_ms: u64) -> Self {
        Self::Timeout {
            stage: stage.into(),
            deadline_ms,
        }
    }

    /// Returns true if the error aborts a running job.
    #[must_use]
    pub fn is_job_fatal(&self) -> bool {
        matches!(
            self,
            Self::StageExecution { .. } | Self::Timeout { .. } | Self::Persistence(_)
        )
    }
}

/// Result alias for conveyor operations.
pub type Result<T> = std::result::Result<T, ConveyorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_execution_display() {
        let err = ConveyorError::stage_execution("generate", "compile failed");
        assert_eq!(err.to_string(), "Stage 'generate' failed: compile failed");
    }

    #[test]
    fn test_timeout_display() {
        let err = ConveyorError::timeout("review", 30_000);
        assert_eq!(err.to_string(), "Stage 'review' timed out after 30000ms");
    }

    #[test]
    fn test_job_fatal_classification() {
        assert!(ConveyorError::stage_execution("s", "boom").is_job_fatal());
        assert!(ConveyorError::timeout("s", 1).is_job_fatal());
        assert!(ConveyorError::Persistence("disk".into()).is_job_fatal());
        assert!(!ConveyorError::Channel("reset".into()).is_job_fatal());
        assert!(!ConveyorError::Validation("empty".into()).is_job_fatal());
    }
}
