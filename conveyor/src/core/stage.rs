//! Per-stage progress tracking.

use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of a single pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageProgressStatus {
    /// Stage has not started yet.
    Idle,
    /// Stage is currently executing.
    Running,
    /// Stage finished successfully.
    Completed,
    /// Stage failed.
    Error,
}

impl Default for StageProgressStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for StageProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl StageProgressStatus {
    /// Returns true if the status represents a terminal per-stage state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Live progress of one stage within a job.
///
/// Entries are created lazily in the idle state when the job is created and
/// mutated only by the orchestrator while executing that stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageProgress {
    /// The name of the stage (matches an entry in the job's stage sequence).
    pub stage_name: String,

    /// The current status of the stage.
    pub status: StageProgressStatus,

    /// Completion percentage, 0-100. Non-decreasing while running.
    pub progress: u8,

    /// Short description of the task currently being performed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,

    /// Ordered log of progress messages emitted by the stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,

    /// When the stage started running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Timestamp>,

    /// When the stage reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<Timestamp>,

    /// Error detail, set when status is `Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageProgress {
    /// Creates a new idle stage progress entry.
    #[must_use]
    pub fn idle(stage_name: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageProgressStatus::Idle,
            progress: 0,
            current_task: None,
            messages: Vec::new(),
            start_time: None,
            end_time: None,
            error: None,
        }
    }

    /// Marks the stage as running.
    pub fn mark_running(&mut self, now: Timestamp) {
        self.status = StageProgressStatus::Running;
        self.start_time = Some(now);
    }

    /// Marks the stage as completed with full progress.
    pub fn mark_completed(&mut self, now: Timestamp) {
        self.status = StageProgressStatus::Completed;
        self.progress = 100;
        self.current_task = None;
        self.end_time = Some(now);
    }

    /// Marks the stage as failed with an error detail.
    pub fn mark_error(&mut self, error: impl Into<String>, now: Timestamp) {
        self.status = StageProgressStatus::Error;
        self.error = Some(error.into());
        self.end_time = Some(now);
    }

    /// Advances the progress percentage.
    ///
    /// Progress is clamped to 100 and never moves backwards; a stale lower
    /// value is ignored.
    pub fn advance(&mut self, progress: u8) {
        let clamped = progress.min(100);
        if clamped > self.progress {
            self.progress = clamped;
        }
    }

    /// Appends a progress message and updates the current task description.
    pub fn push_message(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.current_task = Some(message.clone());
        self.messages.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils;

    #[test]
    fn test_idle_entry() {
        let sp = StageProgress::idle("plan");
        assert_eq!(sp.status, StageProgressStatus::Idle);
        assert_eq!(sp.progress, 0);
        assert!(sp.start_time.is_none());
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut sp = StageProgress::idle("plan");
        sp.mark_running(utils::now());
        sp.advance(40);
        sp.advance(20);
        assert_eq!(sp.progress, 40);
        sp.advance(90);
        assert_eq!(sp.progress, 90);
    }

    #[test]
    fn test_progress_never_decreases_over_random_updates() {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        let mut sp = StageProgress::idle("plan");
        sp.mark_running(utils::now());

        let mut high = 0;
        for _ in 0..500 {
            sp.advance(rng.gen_range(0..=130));
            assert!(sp.progress >= high, "progress regressed");
            assert!(sp.progress <= 100);
            high = sp.progress;
        }
    }

    #[test]
    fn test_progress_clamped() {
        let mut sp = StageProgress::idle("plan");
        sp.advance(250);
        assert_eq!(sp.progress, 100);
    }

    #[test]
    fn test_completed_sets_full_progress() {
        let mut sp = StageProgress::idle("plan");
        sp.mark_running(utils::now());
        sp.advance(30);
        sp.mark_completed(utils::now());
        assert_eq!(sp.progress, 100);
        assert!(sp.end_time.is_some());
    }

    #[test]
    fn test_error_detail() {
        let mut sp = StageProgress::idle("plan");
        sp.mark_running(utils::now());
        sp.mark_error("compile failed", utils::now());
        assert_eq!(sp.status, StageProgressStatus::Error);
        assert_eq!(sp.error.as_deref(), Some("compile failed"));
    }

    #[test]
    fn test_status_serialize_snake_case() {
        let json = serde_json::to_string(&StageProgressStatus::Running).unwrap();
        assert_eq!(json, r#""running""#);
    }
}
