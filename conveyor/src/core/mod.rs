//! Core domain types: jobs, per-stage progress, artifacts, and the wire
//! envelope pushed to observers.

mod artifact;
mod job;
mod message;
mod stage;

pub use artifact::{Artifact, ArtifactContent};
pub use job::{Job, JobId, JobStatus};
pub use message::{ChannelMessage, MessageKind};
pub use stage::{StageProgress, StageProgressStatus};
