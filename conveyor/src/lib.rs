//! # Conveyor
//!
//! A multi-stage asynchronous job pipeline orchestrator with live progress
//! synchronization for observers.
//!
//! Conveyor turns a single request into a set of produced artifacts by
//! running a fixed ordered sequence of stage capabilities, and keeps any
//! number of observing clients synchronized with the pipeline's progress:
//!
//! - **Stage sequencing**: jobs run their stages strictly in order, each
//!   under a deadline and a shared worker budget
//! - **Canonical state**: a single-writer-per-job state store whose
//!   snapshots are always internally consistent
//! - **Fan-out**: per-job subscribers receive an initial snapshot followed
//!   by a gap-free stream of deltas; terminal events survive backpressure
//! - **Resilient clients**: reconnect with exponential backoff, sequence
//!   dedup, snapshot reconciliation, and polling fallback
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use conveyor::prelude::*;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(CapabilityRegistry::new());
//! registry.register(Arc::new(NoOpCapability::new("plan")));
//! registry.register(Arc::new(NoOpCapability::new("generate")));
//!
//! let orchestrator = Arc::new(JobOrchestrator::new(
//!     registry,
//!     OrchestratorConfig::default(),
//! ));
//! let job_id = orchestrator.create("build X", vec!["plan".into(), "generate".into()])?;
//! orchestrator.spawn(job_id);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod broadcast;
pub mod cancellation;
pub mod capability;
pub mod client;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod orchestrator;
pub mod store;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::broadcast::{FanoutMetrics, JobSnapshot, ProgressBroadcaster, Subscription};
    pub use crate::cancellation::CancellationToken;
    pub use crate::capability::{
        CapabilityRegistry, FnCapability, NoOpCapability, ProgressReporter, RetryCapability,
        RetryPolicy, StageCapability, StageOutcome,
    };
    pub use crate::client::{
        ChannelClient, ChannelTransport, ClientProjection, ClientState, LocalSnapshotSource,
        LocalTransport, MessageStream, SnapshotSource,
    };
    pub use crate::config::{ClientConfig, OrchestratorConfig};
    pub use crate::context::JobContext;
    pub use crate::core::{
        Artifact, ArtifactContent, ChannelMessage, Job, JobId, JobStatus, MessageKind,
        StageProgress, StageProgressStatus,
    };
    pub use crate::errors::{ConveyorError, Result};
    pub use crate::orchestrator::JobOrchestrator;
    pub use crate::store::JobStateStore;
    pub use crate::utils::{generate_uuid, iso_timestamp, Timestamp};
}
