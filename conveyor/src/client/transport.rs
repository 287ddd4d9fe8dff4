//! Transport seams for the push channel and the pull endpoint.
//!
//! The client is written against these traits so the in-process broadcaster
//! backs them directly and tests can inject failing transports.

use crate::broadcast::{JobSnapshot, ProgressBroadcaster, Subscription};
use crate::core::{ChannelMessage, JobId};
use crate::errors::{ConveyorError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// The pull endpoint: fetches a full, consistent job snapshot.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetches the current snapshot for a job.
    ///
    /// # Errors
    ///
    /// Returns `ConveyorError::Channel` when the job is unknown or the
    /// endpoint is unreachable.
    async fn fetch_snapshot(&self, job_id: JobId) -> Result<JobSnapshot>;
}

/// One live connection's ordered message stream.
#[async_trait]
pub trait MessageStream: Send {
    /// Receives the next message.
    ///
    /// `Ok(None)` means the server closed the stream cleanly; an error is a
    /// transport failure the client recovers from.
    ///
    /// # Errors
    ///
    /// Returns `ConveyorError::Channel` on transport failure.
    async fn next_message(&mut self) -> Result<Option<ChannelMessage>>;

    /// Sends a lightweight liveness ping.
    ///
    /// # Errors
    ///
    /// Returns `ConveyorError::Channel` if the connection is dead.
    async fn ping(&mut self) -> Result<()> {
        Ok(())
    }
}

/// The push channel: opens a persistent per-job connection.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Connects to a job's progress channel.
    ///
    /// Returns the snapshot current at connect time together with the live
    /// stream of subsequent deltas, so the receiver can never miss an event
    /// published between connect and its first state read.
    ///
    /// # Errors
    ///
    /// Returns `ConveyorError::Channel` when the connection cannot be
    /// established.
    async fn connect(&self, job_id: JobId) -> Result<(JobSnapshot, Box<dyn MessageStream>)>;
}

/// In-process transport backed directly by a [`ProgressBroadcaster`].
#[derive(Debug, Clone)]
pub struct LocalTransport {
    broadcaster: Arc<ProgressBroadcaster>,
}

impl LocalTransport {
    /// Creates a transport over the given broadcaster.
    #[must_use]
    pub fn new(broadcaster: Arc<ProgressBroadcaster>) -> Self {
        Self { broadcaster }
    }
}

struct LocalStream {
    subscription: Subscription,
}

#[async_trait]
impl MessageStream for LocalStream {
    async fn next_message(&mut self) -> Result<Option<ChannelMessage>> {
        Ok(self.subscription.recv().await)
    }
}

#[async_trait]
impl ChannelTransport for LocalTransport {
    async fn connect(&self, job_id: JobId) -> Result<(JobSnapshot, Box<dyn MessageStream>)> {
        let (snapshot, subscription) = self.broadcaster.subscribe(job_id)?;
        Ok((snapshot, Box::new(LocalStream { subscription })))
    }
}

/// In-process pull endpoint backed by a [`ProgressBroadcaster`]'s store view.
#[derive(Debug, Clone)]
pub struct LocalSnapshotSource {
    broadcaster: Arc<ProgressBroadcaster>,
}

impl LocalSnapshotSource {
    /// Creates a snapshot source over the given broadcaster.
    #[must_use]
    pub fn new(broadcaster: Arc<ProgressBroadcaster>) -> Self {
        Self { broadcaster }
    }
}

#[async_trait]
impl SnapshotSource for LocalSnapshotSource {
    async fn fetch_snapshot(&self, job_id: JobId) -> Result<JobSnapshot> {
        self.broadcaster
            .snapshot(job_id)
            .ok_or_else(|| ConveyorError::Channel(format!("unknown job {job_id}")))
    }
}
