//! Frame extraction worker.
//!
//! This crate provides:
//! - The frame extraction pipeline (fetch, sample, package, publish, reap)
//! - Per-run scratch isolation and best-effort cleanup
//! - Per-record outcomes aggregated per trigger event
//! - A trigger stream executor with failure routing
//! - Structured run logging and metrics

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod outcome;
pub mod pipeline;
pub mod scratch;

pub use config::WorkerConfig;
pub use error::{PipelineError, WorkerError, WorkerResult};
pub use executor::{abandoned_report, process_event_file, route_failures, TriggerExecutor};
pub use logging::RunLogger;
pub use outcome::{CompletedRun, FailedRun, InvocationReport, RecordOutcome};
pub use pipeline::{FramePipeline, RunState};
pub use scratch::{CleanupSummary, Reaper, ScratchSpace};
