//! The single observed job state consumed by callers.

use crate::broadcast::JobSnapshot;
use crate::core::{Artifact, ChannelMessage, Job, JobStatus, MessageKind, StageProgress};
use parking_lot::RwLock;

#[derive(Debug, Default)]
struct Inner {
    job: Option<Job>,
    last_sequence: u64,
}

/// Merges push deltas and pull snapshots into one observed state.
///
/// Deltas are deduplicated by sequence number: a message whose sequence is
/// not greater than the last applied one is discarded, so replaying a
/// message stream is idempotent. Snapshots win over delta-derived state,
/// guaranteeing convergence after any interval of missed deltas.
#[derive(Debug, Default)]
pub struct ClientProjection {
    inner: RwLock<Inner>,
}

impl ClientProjection {
    /// Creates an empty projection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the observed job state, if any.
    #[must_use]
    pub fn job(&self) -> Option<Job> {
        self.inner.read().job.clone()
    }

    /// Returns the sequence of the last applied delta (or snapshot
    /// watermark).
    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.inner.read().last_sequence
    }

    /// Returns true once the observed job reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.inner
            .read()
            .job
            .as_ref()
            .is_some_and(|job| job.status.is_terminal())
    }

    /// Replaces local state with a snapshot if the snapshot is not older
    /// than what has been applied. Returns true if the snapshot was taken.
    ///
    /// A snapshot's watermark covers every delta published before it, so a
    /// snapshot at or past the local sequence supersedes local state.
    /// Without a usable watermark (pure-poll mode) `updated_at` decides.
    pub fn apply_snapshot(&self, snapshot: &JobSnapshot) -> bool {
        let mut inner = self.inner.write();
        let newer = match inner.job {
            None => true,
            Some(ref current) => {
                snapshot.watermark >= inner.last_sequence
                    || snapshot.job.updated_at > current.updated_at
            }
        };
        if newer {
            inner.job = Some(snapshot.job.clone());
            inner.last_sequence = inner.last_sequence.max(snapshot.watermark);
        }
        newer
    }

    /// Applies one push delta. Returns false for duplicates, out-of-order
    /// messages, and deltas arriving before any base snapshot.
    pub fn apply_message(&self, message: &ChannelMessage) -> bool {
        let mut inner = self.inner.write();
        if message.sequence <= inner.last_sequence {
            return false;
        }
        let Some(job) = inner.job.as_mut() else {
            // No base state to apply a delta to; the reconnect snapshot
            // will cover this message.
            return false;
        };

        match message.kind {
            MessageKind::Status => {
                if let Ok(status) =
                    serde_json::from_value::<JobStatus>(message.payload["status"].clone())
                {
                    job.status = status;
                }
                if let Some(progress) = message.payload["progress"].as_u64() {
                    job.progress = progress.min(100) as u8;
                }
                if let Some(index) = message.payload["current_stage_index"].as_u64() {
                    job.current_stage_index = index as usize;
                }
            }
            MessageKind::StageProgress => {
                if let Ok(stage) =
                    serde_json::from_value::<StageProgress>(message.payload["stage"].clone())
                {
                    if let Some(existing) = job.stage_mut(&stage.stage_name) {
                        *existing = stage;
                    }
                }
                if let Some(progress) = message.payload["job_progress"].as_u64() {
                    job.progress = progress.min(100) as u8;
                }
            }
            MessageKind::ArtifactProduced | MessageKind::ArtifactUpdated => {
                if let Ok(artifact) =
                    serde_json::from_value::<Artifact>(message.payload.clone())
                {
                    if let Some(existing) =
                        job.artifacts.iter_mut().find(|a| a.path == artifact.path)
                    {
                        *existing = artifact;
                    } else {
                        job.artifacts.push(artifact);
                    }
                }
            }
            MessageKind::Error => {
                if let Some(msg) = message.payload["message"].as_str() {
                    job.error_message = Some(msg.to_string());
                }
            }
            MessageKind::Complete => {
                if let Ok(status) =
                    serde_json::from_value::<JobStatus>(message.payload["status"].clone())
                {
                    job.status = status;
                }
                if let Some(progress) = message.payload["progress"].as_u64() {
                    job.progress = progress.min(100) as u8;
                }
                if let Some(msg) = message.payload["error_message"].as_str() {
                    job.error_message = Some(msg.to_string());
                }
            }
        }

        job.updated_at = message.timestamp;
        inner.last_sequence = message.sequence;
        true
    }
}
