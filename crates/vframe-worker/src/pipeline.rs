//! Frame extraction pipeline.
//!
//! One run turns one source video into one frame archive and one
//! completion record:
//!
//! ```text
//! Idle -> Fetching -> Sampling -> Packaging -> Publishing -> CleaningUp -> Done
//! ```
//!
//! A failure in any working stage jumps straight to `CleaningUp`. Cleanup
//! always runs, never fails the run, and there is no retry edge.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, warn, Instrument};
use vframe_media::{FrameSampler, Packager};
use vframe_models::{
    archive_key, CompletionRecord, PipelineStage, RunId, SourceReference, TriggerEvent, ARCHIVE_CONTENT_TYPE,
};
use vframe_queue::Notifier;
use vframe_storage::{ObjectStore, StorageError};

use crate::config::WorkerConfig;
use crate::error::PipelineError;
use crate::logging::RunLogger;
use crate::metrics;
use crate::outcome::{CompletedRun, FailedRun, InvocationReport, RecordOutcome};
use crate::scratch::{Reaper, ScratchSpace};

/// Lifecycle state of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Fetching,
    Sampling,
    Packaging,
    Publishing,
    CleaningUp,
    Done,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Fetching => "fetching",
            RunState::Sampling => "sampling",
            RunState::Packaging => "packaging",
            RunState::Publishing => "publishing",
            RunState::CleaningUp => "cleaning_up",
            RunState::Done => "done",
        }
    }
}

/// What a successful publish produced.
struct Published {
    record: CompletionRecord,
    archive_key: String,
    archive_bytes: u64,
}

/// Runs the pipeline against injected capabilities.
///
/// The store, sampler and notifier are built once by the binary and shared
/// by every run; each run only owns its scratch directory.
pub struct FramePipeline {
    config: WorkerConfig,
    store: Arc<dyn ObjectStore>,
    sampler: Arc<dyn FrameSampler>,
    notifier: Arc<dyn Notifier>,
    packager: Packager,
    reaper: Reaper,
}

impl FramePipeline {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn ObjectStore>,
        sampler: Arc<dyn FrameSampler>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, PipelineError> {
        if config.interval_secs == 0 {
            return Err(PipelineError::configuration("sampling interval must be at least one second"));
        }
        if config.dest_bucket.trim().is_empty() {
            return Err(PipelineError::configuration("destination bucket is empty"));
        }

        Ok(Self {
            config,
            store,
            sampler,
            notifier,
            packager: Packager::new(),
            reaper: Reaper::new(),
        })
    }

    /// Replace the default packager.
    pub fn with_packager(mut self, packager: Packager) -> Self {
        self.packager = packager;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run every record of `event`, one after another.
    ///
    /// A failing record never stops the ones after it. Records that do not
    /// name a bucket and key are reported as trigger failures.
    pub async fn process_event(&self, event: &TriggerEvent) -> InvocationReport {
        let mut outcomes = Vec::new();

        for source in event.sources() {
            let outcome = match source {
                Ok(source) => self.run(&source).await,
                Err(e) => {
                    warn!("Skipping trigger record: {}", e);
                    metrics::record_run(PipelineStage::Trigger.as_str());
                    RecordOutcome::Failed(FailedRun::trigger(e.to_string()))
                }
            };
            outcomes.push(outcome);
        }

        InvocationReport::new(outcomes)
    }

    /// Process one source video end to end.
    pub async fn run(&self, source: &SourceReference) -> RecordOutcome {
        let run_id = RunId::new();
        let logger = RunLogger::new(&run_id, source);
        let span = logger.create_span();

        self.run_with_logger(run_id, source, &logger).instrument(span).await
    }

    async fn run_with_logger(&self, run_id: RunId, source: &SourceReference, logger: &RunLogger) -> RecordOutcome {
        logger.log_stage(RunState::Idle);
        let started_at = Utc::now();
        let scratch = ScratchSpace::for_run(&self.config.work_dir, &run_id, source);
        logger.log_start(&format!("{} every {}s", source, self.config.interval_secs));

        let mut frames = Vec::new();
        let result = self.execute(source, &scratch, started_at, &mut frames, logger).await;

        logger.log_stage(RunState::CleaningUp);
        let cleanup = self.reaper.reap(&scratch, &frames).await;
        metrics::record_cleanup_failures(cleanup.failed);
        if cleanup.failed > 0 {
            logger.log_warning(&format!("{} scratch artifacts could not be removed", cleanup.failed));
        }

        let outcome = match result {
            Ok(published) => {
                logger.log_completion(&format!(
                    "{} frames archived to {}/{}",
                    frames.len(),
                    self.config.dest_bucket,
                    published.archive_key
                ));
                RecordOutcome::Completed(CompletedRun {
                    run_id,
                    source: source.clone(),
                    record: published.record,
                    frame_count: frames.len(),
                    archive_key: published.archive_key,
                    archive_bytes: published.archive_bytes,
                })
            }
            Err(error) => {
                logger.log_error(&error.to_string());
                RecordOutcome::Failed(FailedRun {
                    run_id: Some(run_id),
                    source: Some(source.clone()),
                    stage: error.stage(),
                    error: error.to_string(),
                    started_at,
                })
            }
        };

        logger.log_stage(RunState::Done);
        metrics::record_run(outcome.label());
        outcome
    }

    /// The working stages. `frames` is filled as soon as sampling succeeds
    /// so cleanup sees them even when a later stage fails.
    async fn execute(
        &self,
        source: &SourceReference,
        scratch: &ScratchSpace,
        started_at: DateTime<Utc>,
        frames: &mut Vec<PathBuf>,
        logger: &RunLogger,
    ) -> Result<Published, PipelineError> {
        logger.log_stage(RunState::Fetching);
        let timer = Instant::now();
        scratch
            .prepare()
            .await
            .map_err(|e| PipelineError::Retrieval(StorageError::Io(e)))?;
        let video_bytes = self
            .store
            .download_to_file(&source.bucket, &source.key, scratch.video_path())
            .await
            .map_err(PipelineError::Retrieval)?;
        record_stage(PipelineStage::Fetch, timer);
        debug!("Fetched {} bytes to {}", video_bytes, scratch.video_path().display());

        logger.log_stage(RunState::Sampling);
        let timer = Instant::now();
        *frames = self
            .sampler
            .sample_frames(scratch.video_path(), scratch.frames_dir(), self.config.interval_secs)
            .await
            .map_err(PipelineError::Transcode)?;
        record_stage(PipelineStage::Sample, timer);
        metrics::record_frames_extracted(frames.len());
        if frames.is_empty() {
            logger.log_warning("no frames sampled, packaging an empty archive");
        }

        logger.log_stage(RunState::Packaging);
        let timer = Instant::now();
        let summary = self
            .packager
            .package(frames, scratch.archive_path())
            .await
            .map_err(PipelineError::Packaging)?;
        record_stage(PipelineStage::Package, timer);

        logger.log_stage(RunState::Publishing);
        let timer = Instant::now();
        let key = archive_key(&source.key);
        self.store
            .upload_file(&self.config.dest_bucket, &key, scratch.archive_path(), ARCHIVE_CONTENT_TYPE)
            .await
            .map_err(PipelineError::Upload)?;
        record_stage(PipelineStage::Upload, timer);

        // Once uploaded the archive stays, even if the notification fails
        let timer = Instant::now();
        let record = CompletionRecord::new(source.key.clone(), started_at, Utc::now());
        self.notifier
            .notify_completed(&record)
            .await
            .map_err(PipelineError::Notification)?;
        record_stage(PipelineStage::Notify, timer);

        Ok(Published {
            record,
            archive_key: key,
            archive_bytes: summary.archive_bytes,
        })
    }
}

fn record_stage(stage: PipelineStage, started: Instant) {
    metrics::record_stage_duration(stage.as_str(), started.elapsed().as_secs_f64());
}
