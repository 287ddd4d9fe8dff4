//! The wire envelope pushed to observers over the progress channel.

use super::JobId;
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Overall job status changed.
    Status,
    /// A stage's progress entry changed.
    StageProgress,
    /// A new artifact was produced.
    ArtifactProduced,
    /// An existing artifact was updated.
    ArtifactUpdated,
    /// The job failed; payload carries the error detail.
    Error,
    /// The job reached a terminal state; always the last message for a job.
    Complete,
}

impl MessageKind {
    /// Returns true for messages that must never be dropped by the
    /// broadcaster's overflow policy.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error | Self::Complete)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status => write!(f, "status"),
            Self::StageProgress => write!(f, "stage_progress"),
            Self::ArtifactProduced => write!(f, "artifact_produced"),
            Self::ArtifactUpdated => write!(f, "artifact_updated"),
            Self::Error => write!(f, "error"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// One push-delivered delta.
///
/// `sequence` is monotonic per job; observers discard any message whose
/// sequence is not greater than the last one they applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// The message kind.
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// The job this message belongs to.
    pub job_id: JobId,

    /// The stage the message concerns, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_name: Option<String>,

    /// Kind-specific payload.
    pub payload: serde_json::Value,

    /// Monotonic per-job sequence number.
    pub sequence: u64,

    /// When the message was published.
    pub timestamp: Timestamp,
}

impl ChannelMessage {
    /// Creates a new message.
    #[must_use]
    pub fn new(
        kind: MessageKind,
        job_id: JobId,
        sequence: u64,
        payload: serde_json::Value,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            kind,
            job_id,
            stage_name: None,
            payload,
            sequence,
            timestamp,
        }
    }

    /// Attaches the stage the message concerns.
    #[must_use]
    pub fn for_stage(mut self, stage_name: impl Into<String>) -> Self {
        self.stage_name = Some(stage_name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils;

    #[test]
    fn test_terminal_kinds() {
        assert!(MessageKind::Error.is_terminal());
        assert!(MessageKind::Complete.is_terminal());
        assert!(!MessageKind::Status.is_terminal());
        assert!(!MessageKind::StageProgress.is_terminal());
        assert!(!MessageKind::ArtifactProduced.is_terminal());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&MessageKind::ArtifactProduced).unwrap();
        assert_eq!(json, r#""artifact_produced""#);
    }

    #[test]
    fn test_envelope_round_trip() {
        let msg = ChannelMessage::new(
            MessageKind::StageProgress,
            utils::generate_uuid(),
            7,
            serde_json::json!({"progress": 40}),
            utils::now(),
        )
        .for_stage("generate");

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"stage_progress""#));

        let back: ChannelMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sequence, 7);
        assert_eq!(back.stage_name.as_deref(), Some("generate"));
    }
}
