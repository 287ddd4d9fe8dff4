//! Job orchestration: creation, stage sequencing, cancellation.
//!
//! Each job runs on an independent tokio task. Within a job, stages execute
//! strictly sequentially; across jobs, concurrent stage invocations are
//! bounded by the worker-budget semaphore. Every state change goes through
//! the store first and is then published to the broadcaster, so push deltas
//! never run ahead of canonical state.


use crate::broadcast::ProgressBroadcaster;
use crate::cancellation::CancellationToken;
use crate::capability::{CapabilityRegistry, ProgressReporter, ProgressUpdate, StageOutcome};
use crate::config::OrchestratorConfig;
use crate::context::JobContext;
use crate::core::{Job, JobId, JobStatus, MessageKind};
use crate::errors::{ConveyorError, Result};
use crate::store::JobStateStore;
use crate::utils;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Creates jobs, runs their stage sequences, and keeps store and
/// broadcaster in sync.
pub struct JobOrchestrator {
    store: Arc<JobStateStore>,
    broadcaster: Arc<ProgressBroadcaster>,
    registry: Arc<CapabilityRegistry>,
    config: OrchestratorConfig,
    worker_budget: Arc<Semaphore>,
    cancel_tokens: DashMap<JobId, Arc<CancellationToken>>,
}

impl JobOrchestrator {
    /// Creates an orchestrator with its own store and broadcaster.
    #[must_use]
    pub fn new(registry: Arc<CapabilityRegistry>, config: OrchestratorConfig) -> Self {
        let store = Arc::new(JobStateStore::new());
        let broadcaster = Arc::new(ProgressBroadcaster::new(
            store.clone(),
            config.subscriber_queue_capacity,
        ));
        Self {
            store,
            broadcaster,
            registry,
            worker_budget: Arc::new(Semaphore::new(config.worker_budget.max(1))),
            config,
            cancel_tokens: DashMap::new(),
        }
    }

    /// Returns the canonical state store (the pull endpoint).
    #[must_use]
    pub fn store(&self) -> Arc<JobStateStore> {
        self.store.clone()
    }

    /// Returns the progress broadcaster (the push channel).
    #[must_use]
    pub fn broadcaster(&self) -> Arc<ProgressBroadcaster> {
        self.broadcaster.clone()
    }

    /// Creates a new pending job.
    ///
    /// # Errors
    ///
    /// Returns `ConveyorError::Validation` if the stage sequence is empty or
    /// names a stage with no registered capability. Nothing is stored on
    /// rejection.
    pub fn create(
        &self,
        description: impl Into<String>,
        stage_sequence: Vec<String>,
    ) -> Result<JobId> {
        if stage_sequence.is_empty() {
            return Err(ConveyorError::Validation(
                "stage sequence must not be empty".into(),
            ));
        }
        if let Some(missing) = stage_sequence
            .iter()
            .find(|name| !self.registry.contains(name))
        {
            return Err(ConveyorError::Validation(format!(
                "no capability registered for stage '{missing}'"
            )));
        }

        let job = Job::new(
            utils::generate_uuid(),
            description,
            stage_sequence,
            utils::now(),
        );
        let job_id = job.id;
        self.store.insert(job);
        info!(%job_id, "Job created");
        Ok(job_id)
    }

    /// Requests cooperative cancellation of a job.
    ///
    /// The flag is checked at stage boundaries only; an in-flight stage's
    /// result is discarded if cancellation was requested during it. A job
    /// that was never started is cancelled immediately.
    ///
    /// # Errors
    ///
    /// Returns `ConveyorError::Persistence` if the job does not exist.
    pub fn cancel(&self, job_id: JobId) -> Result<()> {
        let current = self
            .store
            .get(job_id)
            .ok_or_else(|| ConveyorError::Persistence(format!("unknown job {job_id}")))?;
        if current.status.is_terminal() {
            debug!(%job_id, status = %current.status, "Cancel ignored, job already finished");
            return Ok(());
        }
        self.token(job_id).cancel("cancellation requested");

        // A pending job has no stage boundary to observe the flag at, so it
        // is finalized here.
        let mut transitioned = false;
        let snapshot = self.store.apply(job_id, |job| {
            if job.status == JobStatus::Pending {
                transitioned = job.transition(JobStatus::Cancelled, utils::now());
            }
        })?;
        if transitioned {
            self.cancel_tokens.remove(&job_id);
            self.publish_status(&snapshot);
            self.publish_complete(&snapshot);
        } else if snapshot.status.is_terminal() {
            // The job finished between the terminal check above and the
            // flag being raised; nothing is left to observe the token.
            self.cancel_tokens.remove(&job_id);
        }
        info!(%job_id, "Cancellation requested");
        Ok(())
    }

    /// Spawns `run` on its own task.
    pub fn spawn(self: &Arc<Self>, job_id: JobId) -> JoinHandle<Result<()>> {
        let this = self.clone();
        tokio::spawn(async move { this.run(job_id).await })
    }

    /// Runs the job's stage sequence to a terminal state.
    ///
    /// # Errors
    ///
    /// Returns the failing stage's error when the pipeline aborts, or a
    /// persistence error if canonical state could not be recorded.
    pub async fn run(&self, job_id: JobId) -> Result<()> {
        let mut started = false;
        let snapshot = self.store.apply(job_id, |job| {
            started = job.transition(JobStatus::Running, utils::now());
        })?;
        if !started {
            // Already running, or cancelled/finished before the run started.
            debug!(%job_id, status = %snapshot.status, "Run skipped, job not startable");
            return Ok(());
        }
        self.publish_status(&snapshot);

        // The token is created only once the job actually starts; terminal
        // paths below drop it again.
        let token = self.token(job_id);

        let ctx = Arc::new(JobContext::new(snapshot.description.clone()));
        let stage_sequence = snapshot.stage_sequence.clone();

        for (index, stage_name) in stage_sequence.iter().enumerate() {
            if token.is_cancelled() {
                return self.finalize_cancelled(job_id);
            }

            let snapshot = self.store.apply(job_id, |job| {
                job.current_stage_index = index;
                job.updated_at = utils::now();
                if let Some(stage) = job.stage_mut(stage_name) {
                    stage.mark_running(utils::now());
                }
            })?;
            self.publish_stage_progress(&snapshot, stage_name);
            info!(%job_id, stage = %stage_name, "Stage started");

            let invocation = self.invoke_stage(job_id, stage_name, ctx.clone()).await;

            if token.is_cancelled() {
                // The stage could not be preempted; its result is discarded.
                debug!(%job_id, stage = %stage_name, "Discarding in-flight stage result after cancellation");
                return self.finalize_cancelled(job_id);
            }

            match invocation {
                Ok(outcome) => {
                    ctx.record_output(stage_name.clone(), outcome.data.clone());
                    let snapshot = self.store.apply(job_id, |job| {
                        let now = utils::now();
                        if let Some(stage) = job.stage_mut(stage_name) {
                            stage.mark_completed(now);
                        }
                        job.artifacts.extend(outcome.artifacts.iter().cloned());
                        job.current_stage_index = (index + 1).min(job.stage_sequence.len() - 1);
                        job.recompute_progress();
                        job.updated_at = now;
                    })?;
                    self.publish_stage_progress(&snapshot, stage_name);
                    for artifact in &outcome.artifacts {
                        self.broadcaster.publish(
                            job_id,
                            MessageKind::ArtifactProduced,
                            Some(stage_name),
                            serde_json::to_value(artifact).unwrap_or_default(),
                        );
                    }
                    info!(%job_id, stage = %stage_name, "Stage completed");
                }
                Err(err) => {
                    let message = err.to_string();
                    let snapshot = self.store.apply(job_id, |job| {
                        let now = utils::now();
                        if let Some(stage) = job.stage_mut(stage_name) {
                            stage.mark_error(&message, now);
                        }
                        job.error_message = Some(message.clone());
                        job.transition(JobStatus::Failed, now);
                    })?;
                    self.broadcaster.publish(
                        job_id,
                        MessageKind::Error,
                        Some(stage_name),
                        serde_json::json!({"message": message}),
                    );
                    self.publish_complete(&snapshot);
                    self.cancel_tokens.remove(&job_id);
                    error!(%job_id, stage = %stage_name, %message, "Stage failed, pipeline stopped");
                    return Err(err);
                }
            }
        }

        let snapshot = self.store.apply(job_id, |job| {
            job.transition(JobStatus::Completed, utils::now());
        })?;
        self.publish_status(&snapshot);
        self.publish_complete(&snapshot);
        self.cancel_tokens.remove(&job_id);
        info!(%job_id, "Job completed");
        Ok(())
    }

    /// Invokes one stage under the worker budget and deadline, draining its
    /// progress reports into store updates and push deltas.
    async fn invoke_stage(
        &self,
        job_id: JobId,
        stage_name: &str,
        ctx: Arc<JobContext>,
    ) -> Result<StageOutcome> {
        let capability = self.registry.get(stage_name).ok_or_else(|| {
            ConveyorError::stage_execution(stage_name, "capability no longer registered")
        })?;

        let _permit = self
            .worker_budget
            .acquire()
            .await
            .map_err(|_| ConveyorError::Persistence("worker budget semaphore closed".into()))?;

        let (reporter, mut reports) = ProgressReporter::channel();
        let drain = {
            let store = self.store.clone();
            let broadcaster = self.broadcaster.clone();
            let stage_name = stage_name.to_string();
            tokio::spawn(async move {
                while let Some(update) = reports.recv().await {
                    apply_progress_report(&store, &broadcaster, job_id, &stage_name, update);
                }
            })
        };

        let deadline = self.config.stage_deadline();
        let result = match tokio::time::timeout(deadline, capability.invoke(ctx, reporter)).await {
            Ok(result) => result,
            Err(_) => Err(ConveyorError::timeout(
                stage_name,
                self.config.stage_deadline_ms,
            )),
        };

        // The reporter (and any clones inside the invocation) is gone once
        // the future resolves or is dropped on timeout, so the drain task
        // terminates; awaiting it keeps progress writes ordered before the
        // stage's terminal state write.
        if let Err(e) = drain.await {
            warn!(%job_id, stage = %stage_name, "Progress drain task failed: {e}");
        }

        result
    }

    fn finalize_cancelled(&self, job_id: JobId) -> Result<()> {
        let mut transitioned = false;
        let snapshot = self.store.apply(job_id, |job| {
            transitioned = job.transition(JobStatus::Cancelled, utils::now());
            if transitioned {
                // A discarded in-flight stage is reverted to idle; its
                // result never reached the store.
                for stage in &mut job.stages {
                    if stage.status == crate::core::StageProgressStatus::Running {
                        *stage = crate::core::StageProgress::idle(stage.stage_name.clone());
                    }
                }
            }
        })?;
        if transitioned {
            self.cancel_tokens.remove(&job_id);
            self.publish_status(&snapshot);
            self.publish_complete(&snapshot);
            info!(%job_id, "Job cancelled at stage boundary");
        }
        Ok(())
    }

    fn publish_status(&self, snapshot: &Job) {
        self.broadcaster.publish(
            snapshot.id,
            MessageKind::Status,
            None,
            serde_json::json!({
                "status": snapshot.status,
                "progress": snapshot.progress,
                "current_stage_index": snapshot.current_stage_index,
            }),
        );
    }

    fn publish_complete(&self, snapshot: &Job) {
        self.broadcaster.publish(
            snapshot.id,
            MessageKind::Complete,
            None,
            serde_json::json!({
                "status": snapshot.status,
                "progress": snapshot.progress,
                "error_message": snapshot.error_message,
            }),
        );
    }

    fn publish_stage_progress(&self, snapshot: &Job, stage_name: &str) {
        let payload = snapshot.stage(stage_name).map_or_else(
            || serde_json::json!({}),
            |stage| {
                serde_json::json!({
                    "stage": serde_json::to_value(stage).unwrap_or_default(),
                    "job_progress": snapshot.progress,
                })
            },
        );
        self.broadcaster
            .publish(snapshot.id, MessageKind::StageProgress, Some(stage_name), payload);
    }

    fn token(&self, job_id: JobId) -> Arc<CancellationToken> {
        self.cancel_tokens
            .entry(job_id)
            .or_insert_with(|| Arc::new(CancellationToken::new()))
            .clone()
    }
}

impl std::fmt::Debug for JobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Applies one in-flight progress report to canonical state and publishes
/// the resulting delta.
fn apply_progress_report(
    store: &JobStateStore,
    broadcaster: &ProgressBroadcaster,
    job_id: JobId,
    stage_name: &str,
    update: ProgressUpdate,
) {
    let applied = store.apply(job_id, |job| {
        if let Some(stage) = job.stage_mut(stage_name) {
            if let Some(percent) = update.progress {
                stage.advance(percent);
            }
            if let Some(message) = update.message {
                stage.push_message(message);
            }
        }
        job.recompute_progress();
        job.updated_at = utils::now();
    });

    match applied {
        Ok(snapshot) => {
            if let Some(stage) = snapshot.stage(stage_name) {
                broadcaster.publish(
                    job_id,
                    MessageKind::StageProgress,
                    Some(stage_name),
                    serde_json::json!({
                        "stage": serde_json::to_value(stage).unwrap_or_default(),
                        "job_progress": snapshot.progress,
                    }),
                );
            }
        }
        Err(e) => warn!(%job_id, stage = %stage_name, "Dropping progress report: {e}"),
    }
}
