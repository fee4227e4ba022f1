//! Structured run logging utilities.
//!
//! Every line emitted through [`RunLogger`] carries the run ID and the
//! source object, so one run can be followed through the logs even when
//! several triggers are processed back to back.

use tracing::{error, info, warn, Span};
use vframe_models::{RunId, SourceReference};

use crate::pipeline::RunState;

/// Logger for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
    bucket: String,
    key: String,
}

impl RunLogger {
    pub fn new(run_id: &RunId, source: &SourceReference) -> Self {
        Self {
            run_id: run_id.to_string(),
            bucket: source.bucket.clone(),
            key: source.key.clone(),
        }
    }

    /// Log the start of a run.
    pub fn log_start(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            bucket = %self.bucket,
            key = %self.key,
            "Run started: {}", message
        );
    }

    /// Log a state transition.
    pub fn log_stage(&self, state: RunState) {
        info!(
            run_id = %self.run_id,
            stage = state.as_str(),
            "Run stage: {}", state.as_str()
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            run_id = %self.run_id,
            key = %self.key,
            "Run warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            run_id = %self.run_id,
            bucket = %self.bucket,
            key = %self.key,
            "Run failed: {}", message
        );
    }

    /// Log the successful end of a run.
    pub fn log_completion(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            key = %self.key,
            "Run completed: {}", message
        );
    }

    /// Create a tracing span for this run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "run",
            run_id = %self.run_id,
            bucket = %self.bucket,
            key = %self.key
        )
    }
}

