//! The job aggregate: one end-to-end request through the pipeline.

use super::{Artifact, StageProgress, StageProgressStatus};
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a job.
pub type JobId = Uuid;

/// The lifecycle status of a job.
///
/// Transitions are monotonic: `Pending → Running → {Completed | Failed |
/// Cancelled}`. Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created but not yet started.
    Pending,
    /// The stage sequence is executing.
    Running,
    /// All stages completed successfully.
    Completed,
    /// A stage failed; the pipeline stopped at that stage.
    Failed,
    /// Cooperative cancellation was honored at a stage boundary.
    Cancelled,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl JobStatus {
    /// Returns true if no further status transitions are possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if `next` is a legal transition from this status.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Cancelled),
            Self::Running => next.is_terminal(),
            _ => false,
        }
    }
}

/// Canonical state of one job, as held by the state store.
///
/// Snapshots of this struct are what observers receive; all mutation goes
/// through the orchestrator under the store's per-id writer lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,

    /// The user request this job was created for.
    pub description: String,

    /// Ordered list of stage names to execute.
    pub stage_sequence: Vec<String>,

    /// Current lifecycle status.
    pub status: JobStatus,

    /// Overall completion percentage, 0-100, derived from stage progress.
    pub progress: u8,

    /// Index into `stage_sequence` of the stage currently (or next to be)
    /// executed.
    pub current_stage_index: usize,

    /// When the job was created.
    pub created_at: Timestamp,

    /// When the job state last changed.
    pub updated_at: Timestamp,

    /// Failure detail, set when status is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Artifacts produced so far, across all completed stages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,

    /// Per-stage progress entries, one per stage in `stage_sequence`.
    pub stages: Vec<StageProgress>,
}

impl Job {
    /// Creates a new pending job with all stages idle.
    #[must_use]
    pub fn new(
        id: JobId,
        description: impl Into<String>,
        stage_sequence: Vec<String>,
        now: Timestamp,
    ) -> Self {
        let stages = stage_sequence
            .iter()
            .map(StageProgress::idle)
            .collect();
        Self {
            id,
            description: description.into(),
            stage_sequence,
            status: JobStatus::Pending,
            progress: 0,
            current_stage_index: 0,
            created_at: now,
            updated_at: now,
            error_message: None,
            artifacts: Vec::new(),
            stages,
        }
    }

    /// Returns the stage progress entry for the given stage name.
    #[must_use]
    pub fn stage(&self, stage_name: &str) -> Option<&StageProgress> {
        self.stages.iter().find(|s| s.stage_name == stage_name)
    }

    /// Returns a mutable stage progress entry for the given stage name.
    pub fn stage_mut(&mut self, stage_name: &str) -> Option<&mut StageProgress> {
        self.stages.iter_mut().find(|s| s.stage_name == stage_name)
    }

    /// Recomputes the overall progress from per-stage progress.
    ///
    /// Each completed stage contributes a full share; the in-flight stage
    /// contributes its own percentage of one share. The result never
    /// decreases because per-stage progress never decreases and completed
    /// stages stay completed.
    pub fn recompute_progress(&mut self) {
        if self.stages.is_empty() {
            return;
        }
        let total: u32 = self
            .stages
            .iter()
            .map(|s| match s.status {
                StageProgressStatus::Completed => 100,
                _ => u32::from(s.progress),
            })
            .sum();
        let derived = total / self.stages.len() as u32;
        self.progress = self.progress.max(derived.min(100) as u8);
    }

    /// Applies a status transition, ignoring illegal ones.
    ///
    /// Returns true if the transition was applied. Terminal states are
    /// absorbing, so a late transition attempt on a finished job is a no-op.
    pub fn transition(&mut self, next: JobStatus, now: Timestamp) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = now;
        if next == JobStatus::Completed {
            self.progress = 100;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils;

    fn job(stage_names: &[&str]) -> Job {
        Job::new(
            utils::generate_uuid(),
            "build X",
            stage_names.iter().map(|s| (*s).to_string()).collect(),
            utils::now(),
        )
    }

    #[test]
    fn test_new_job_is_pending_with_idle_stages() {
        let job = job(&["plan", "generate", "review"]);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.stages.len(), 3);
        assert!(job
            .stages
            .iter()
            .all(|s| s.status == StageProgressStatus::Idle));
    }

    #[test]
    fn test_status_transitions_monotonic() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn test_terminal_is_absorbing() {
        let mut job = job(&["plan"]);
        let now = utils::now();
        assert!(job.transition(JobStatus::Running, now));
        assert!(job.transition(JobStatus::Failed, now));
        assert!(!job.transition(JobStatus::Completed, now));
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn test_progress_derivation() {
        let mut job = job(&["a", "b", "c", "d"]);
        let now = utils::now();
        job.stages[0].mark_completed(now);
        job.stages[1].mark_running(now);
        job.stages[1].advance(50);
        job.recompute_progress();
        // 100 + 50 over 4 stages
        assert_eq!(job.progress, 37);
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut job = job(&["a", "b"]);
        let now = utils::now();
        job.stages[0].mark_completed(now);
        job.recompute_progress();
        assert_eq!(job.progress, 50);
        // A recompute with no stage movement cannot regress.
        job.recompute_progress();
        assert_eq!(job.progress, 50);
    }

    #[test]
    fn test_completed_forces_full_progress() {
        let mut job = job(&["a"]);
        let now = utils::now();
        job.transition(JobStatus::Running, now);
        job.transition(JobStatus::Completed, now);
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_stage_lookup() {
        let mut job = job(&["plan", "generate"]);
        assert!(job.stage("plan").is_some());
        assert!(job.stage("missing").is_none());
        job.stage_mut("generate").unwrap().push_message("started");
        assert_eq!(job.stage("generate").unwrap().messages.len(), 1);
    }
}
