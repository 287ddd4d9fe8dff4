//! Assertion helpers for job snapshots.

use crate::core::{Job, JobStatus, StageProgressStatus};

/// Asserts that a job completed with full progress and every stage
/// completed.
///
/// # Panics
///
/// Panics if any part of the expectation does not hold.
pub fn assert_job_completed(job: &Job) {
    assert_eq!(
        job.status,
        JobStatus::Completed,
        "expected completed job, got {} (error: {:?})",
        job.status,
        job.error_message
    );
    assert_eq!(job.progress, 100, "completed job must report full progress");
    for stage in &job.stages {
        assert_eq!(
            stage.status,
            StageProgressStatus::Completed,
            "stage '{}' not completed",
            stage.stage_name
        );
    }
}

/// Asserts that a job failed with the given error message.
///
/// # Panics
///
/// Panics if the job is not failed or carries a different message.
pub fn assert_job_failed(job: &Job, expected_message: &str) {
    assert_eq!(job.status, JobStatus::Failed, "expected failed job");
    let message = job.error_message.as_deref().unwrap_or_default();
    assert!(
        message.contains(expected_message),
        "error message '{message}' does not contain '{expected_message}'"
    );
}

/// Asserts the status of a named stage.
///
/// # Panics
///
/// Panics if the stage is missing or has a different status.
pub fn assert_stage_status(job: &Job, stage_name: &str, expected: StageProgressStatus) {
    let stage = job
        .stage(stage_name)
        .unwrap_or_else(|| panic!("job has no stage '{stage_name}'"));
    assert_eq!(
        stage.status, expected,
        "stage '{stage_name}' status mismatch"
    );
}
