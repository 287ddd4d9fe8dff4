//! Fan-out of progress events to per-job subscribers.
//!
//! Subscribers attach per job id and receive the current store snapshot
//! followed by a live stream of deltas. The snapshot is taken under the same
//! critical section that registers the subscriber, so no delta published
//! between connect and the first state read can be missed.
//!
//! Delivery is at-most-once per subscriber over a bounded queue. Under
//! overflow the oldest non-terminal message is evicted; terminal messages
//! (`error`, `complete`) are never dropped.

mod metrics;

pub use metrics::FanoutMetrics;

use crate::core::{ChannelMessage, Job, JobId, MessageKind};
use crate::errors::{ConveyorError, Result};
use crate::store::JobStateStore;
use crate::utils;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// A consistent job snapshot plus the broadcaster's sequence watermark at
/// the instant it was taken.
///
/// Any delta with `sequence <= watermark` is already reflected in the
/// snapshot and must be discarded by the receiver.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    /// The job state.
    pub job: Job,
    /// Highest sequence number published before this snapshot was taken.
    pub watermark: u64,
}

/// Bounded per-subscriber message queue.
///
/// `push` is synchronous and never blocks the publisher; `recv` suspends
/// until a message or close arrives.
#[derive(Debug)]
struct SubscriberQueue {
    messages: Mutex<VecDeque<ChannelMessage>>,
    notify: Notify,
    capacity: usize,
    closed: AtomicBool,
}

impl SubscriberQueue {
    fn new(capacity: usize) -> Self {
        Self {
            messages: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueues a message, evicting the oldest non-terminal message on
    /// overflow. Returns `(enqueued, dropped)`: whether the incoming
    /// message made it into the queue, and whether any message was lost.
    fn push(&self, message: ChannelMessage) -> (bool, bool) {
        let mut evicted = false;
        {
            let mut queue = self.messages.lock();
            if queue.len() >= self.capacity.max(1) {
                // Evict oldest-first, but never a terminal message.
                if let Some(pos) = queue.iter().position(|m| !m.kind.is_terminal()) {
                    queue.remove(pos);
                    evicted = true;
                } else if !message.kind.is_terminal() {
                    // Queue full of terminal messages; drop the incoming one.
                    return (false, true);
                }
            }
            queue.push_back(message);
        }
        self.notify.notify_one();
        (true, evicted)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn recv(&self) -> Option<ChannelMessage> {
        loop {
            if let Some(message) = self.messages.lock().pop_front() {
                return Some(message);
            }
            if self.is_closed() {
                return None;
            }
            self.notify.notified().await;
        }
    }
}

/// A live subscription to one job's progress stream.
///
/// Dropping the subscription closes its queue; the broadcaster prunes it on
/// the next publish.
#[derive(Debug)]
pub struct Subscription {
    /// The job this subscription observes.
    pub job_id: JobId,
    id: u64,
    queue: Arc<SubscriberQueue>,
}

impl Subscription {
    /// Receives the next message, or `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<ChannelMessage> {
        self.queue.recv().await
    }

    /// Returns the subscriber id, unique within the broadcaster.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.queue.close();
    }
}

/// Fan-out channel server for job progress events.
pub struct ProgressBroadcaster {
    store: Arc<JobStateStore>,
    queue_capacity: usize,
    subscribers: Mutex<HashMap<JobId, Vec<(u64, Arc<SubscriberQueue>)>>>,
    sequences: DashMap<JobId, Arc<AtomicU64>>,
    next_subscriber_id: AtomicU64,
    metrics: FanoutMetrics,
}

impl ProgressBroadcaster {
    /// Creates a broadcaster over the given store.
    #[must_use]
    pub fn new(store: Arc<JobStateStore>, queue_capacity: usize) -> Self {
        Self {
            store,
            queue_capacity,
            subscribers: Mutex::new(HashMap::new()),
            sequences: DashMap::new(),
            next_subscriber_id: AtomicU64::new(1),
            metrics: FanoutMetrics::default(),
        }
    }

    /// Subscribes to a job's progress stream.
    ///
    /// Returns the current snapshot and the live stream of subsequent
    /// deltas. Registration and the snapshot read happen under one critical
    /// section so the pair is gap-free.
    ///
    /// # Errors
    ///
    /// Returns `ConveyorError::Channel` if the job does not exist.
    pub fn subscribe(&self, job_id: JobId) -> Result<(JobSnapshot, Subscription)> {
        let queue = Arc::new(SubscriberQueue::new(self.queue_capacity));
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);

        let snapshot = {
            let mut subscribers = self.subscribers.lock();
            let job = self
                .store
                .get(job_id)
                .ok_or_else(|| ConveyorError::Channel(format!("unknown job {job_id}")))?;
            let watermark = self.current_sequence(job_id);
            subscribers
                .entry(job_id)
                .or_default()
                .push((id, queue.clone()));
            JobSnapshot { job, watermark }
        };

        debug!(%job_id, subscriber = id, "Subscriber attached");
        Ok((
            snapshot,
            Subscription {
                job_id,
                id,
                queue,
            },
        ))
    }

    /// Detaches a subscription explicitly.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        let mut subscribers = self.subscribers.lock();
        if let Some(entries) = subscribers.get_mut(&subscription.job_id) {
            entries.retain(|(id, _)| *id != subscription.id);
        }
        subscription.queue.close();
    }

    /// Publishes a delta to all subscribers of a job.
    ///
    /// The message is stamped with the next per-job sequence number and the
    /// publish timestamp, then fanned out without ever blocking on a
    /// subscriber queue. The stamped message is returned.
    pub fn publish(
        &self,
        job_id: JobId,
        kind: MessageKind,
        stage_name: Option<&str>,
        payload: serde_json::Value,
    ) -> ChannelMessage {
        let sequence = self.next_sequence(job_id);
        let mut message = ChannelMessage::new(kind, job_id, sequence, payload, utils::now());
        if let Some(stage) = stage_name {
            message = message.for_stage(stage);
        }

        let targets: Vec<Arc<SubscriberQueue>> = {
            // Brief critical section: copy the current subscriber list and
            // prune closed queues; delivery happens outside the lock.
            let mut subscribers = self.subscribers.lock();
            match subscribers.get_mut(&job_id) {
                Some(entries) => {
                    entries.retain(|(_, q)| !q.is_closed());
                    entries.iter().map(|(_, q)| q.clone()).collect()
                }
                None => Vec::new(),
            }
        };

        for queue in targets {
            let (enqueued, dropped) = queue.push(message.clone());
            if dropped {
                self.metrics.record_drop();
                warn!(
                    %job_id,
                    kind = %message.kind,
                    sequence,
                    "Subscriber queue overflow, non-terminal message dropped"
                );
            }
            if enqueued {
                self.metrics.record_delivery();
            }
        }

        message
    }

    /// Returns a snapshot of the job with the current sequence watermark.
    #[must_use]
    pub fn snapshot(&self, job_id: JobId) -> Option<JobSnapshot> {
        let subscribers = self.subscribers.lock();
        let job = self.store.get(job_id)?;
        let watermark = self.current_sequence(job_id);
        drop(subscribers);
        Some(JobSnapshot { job, watermark })
    }

    /// Returns the number of active subscribers for a job.
    #[must_use]
    pub fn subscriber_count(&self, job_id: JobId) -> usize {
        self.subscribers
            .lock()
            .get(&job_id)
            .map_or(0, |entries| {
                entries.iter().filter(|(_, q)| !q.is_closed()).count()
            })
    }

    /// Returns the fan-out metrics.
    #[must_use]
    pub fn metrics(&self) -> &FanoutMetrics {
        &self.metrics
    }

    fn next_sequence(&self, job_id: JobId) -> u64 {
        self.sequences
            .entry(job_id)
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .fetch_add(1, Ordering::SeqCst)
            + 1
    }

    fn current_sequence(&self, job_id: JobId) -> u64 {
        self.sequences
            .get(&job_id)
            .map_or(0, |seq| seq.load(Ordering::SeqCst))
    }
}

impl std::fmt::Debug for ProgressBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressBroadcaster")
            .field("queue_capacity", &self.queue_capacity)
            .finish_non_exhaustive()
    }
}
