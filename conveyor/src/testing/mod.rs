//! Testing utilities for conveyor pipelines.
//!
//! Scripted capabilities, a fault-injecting transport, and assertion
//! helpers used by the crate's own tests and available to downstream
//! crates.

mod assertions;
mod mocks;

pub use assertions::{assert_job_completed, assert_job_failed, assert_stage_status};
pub use mocks::{
    FailingCapability, FlakyTransport, RecordingCapability, SlowCapability, SuccessCapability,
};
