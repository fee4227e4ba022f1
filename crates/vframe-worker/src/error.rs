//! Worker error types.

use thiserror::Error;
use vframe_media::MediaError;
use vframe_models::PipelineStage;
use vframe_queue::QueueError;
use vframe_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Why a single pipeline run stopped.
///
/// Each variant carries the underlying failure, so the message keeps the
/// store, transcoder or queue error text.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Retrieval failed: {0}")]
    Retrieval(#[source] StorageError),

    #[error("Transcode failed: {0}")]
    Transcode(#[source] MediaError),

    #[error("Packaging failed: {0}")]
    Packaging(#[source] MediaError),

    #[error("Upload failed: {0}")]
    Upload(#[source] StorageError),

    #[error("Notification failed: {0}")]
    Notification(#[source] QueueError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl PipelineError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Stage the run was in when it failed.
    ///
    /// Configuration problems are detected before any stage starts and are
    /// reported against the trigger.
    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::Retrieval(_) => PipelineStage::Fetch,
            PipelineError::Transcode(_) => PipelineStage::Sample,
            PipelineError::Packaging(_) => PipelineStage::Package,
            PipelineError::Upload(_) => PipelineStage::Upload,
            PipelineError::Notification(_) => PipelineStage::Notify,
            PipelineError::Configuration(_) => PipelineStage::Trigger,
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
