//! Canonical job state projection.
//!
//! The store enforces single-writer-per-job-id discipline: all mutation for
//! one job goes through [`JobStateStore::apply`], which holds that job's
//! write lock for the whole mutation. Readers always receive a fully-formed
//! immutable snapshot, never a partially-mutated job.

use crate::core::{Job, JobId};
use crate::errors::{ConveyorError, Result};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Durable, single-writer-per-job canonical state store.
///
/// Backed by a concurrent map of per-job locks; writes for different jobs
/// never contend with each other.
#[derive(Debug, Default)]
pub struct JobStateStore {
    jobs: DashMap<JobId, Arc<RwLock<Job>>>,
}

impl JobStateStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a newly created job.
    pub fn insert(&self, job: Job) {
        self.jobs.insert(job.id, Arc::new(RwLock::new(job)));
    }

    /// Returns true if the job exists.
    #[must_use]
    pub fn contains(&self, job_id: JobId) -> bool {
        self.jobs.contains_key(&job_id)
    }

    /// Returns an immutable snapshot of the job.
    #[must_use]
    pub fn get(&self, job_id: JobId) -> Option<Job> {
        let entry = self.jobs.get(&job_id)?;
        let entry = entry.clone();
        // The map guard is released before the read lock is taken, so a
        // concurrent apply on another job cannot deadlock against the shard.
        let snapshot = entry.read().clone();
        Some(snapshot)
    }

    /// Applies a mutation to the job under its writer lock.
    ///
    /// Returns the post-mutation snapshot, which is what publishers hand to
    /// the broadcaster.
    ///
    /// # Errors
    ///
    /// Returns `ConveyorError::Persistence` if the job does not exist.
    pub fn apply<F>(&self, job_id: JobId, mutate: F) -> Result<Job>
    where
        F: FnOnce(&mut Job),
    {
        let entry = self
            .jobs
            .get(&job_id)
            .map(|e| e.clone())
            .ok_or_else(|| ConveyorError::Persistence(format!("unknown job {job_id}")))?;

        let mut job = entry.write();
        mutate(&mut job);
        Ok(job.clone())
    }

    /// Returns the ids of all stored jobs.
    #[must_use]
    pub fn job_ids(&self) -> Vec<JobId> {
        self.jobs.iter().map(|entry| *entry.key()).collect()
    }

    /// Returns the number of stored jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true if no jobs are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
