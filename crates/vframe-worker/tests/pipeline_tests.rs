//! Pipeline tests against in-memory capabilities.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use vframe_media::{discover_frames, FrameSampler, MediaError, MediaResult, Packager};
use vframe_models::{CompletionRecord, FailureReport, PipelineStage, SourceReference, TriggerEvent};
use vframe_queue::{Notifier, QueueError, QueueResult, TriggerMessage};
use vframe_storage::{ObjectStore, StorageError, StorageResult};
use vframe_worker::{
    abandoned_report, process_event_file, route_failures, FramePipeline, InvocationReport, PipelineError,
    RecordOutcome, WorkerConfig,
};

const DEST_BUCKET: &str = "vframe-archives";

/// Object store kept in memory.
#[derive(Default)]
struct MemoryStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    content_types: Mutex<HashMap<(String, String), String>>,
    reject_uploads: bool,
}

impl MemoryStore {
    fn with_object(self, bucket: &str, key: &str, data: &[u8]) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), data.to_vec());
        self
    }

    fn rejecting_uploads(mut self) -> Self {
        self.reject_uploads = true;
        self
    }

    fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    fn keys_in(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn download_to_file(&self, bucket: &str, key: &str, path: &Path) -> StorageResult<u64> {
        let data = self
            .get(bucket, key)
            .ok_or_else(|| StorageError::not_found(format!("{}/{}", bucket, key)))?;
        tokio::fs::write(path, &data).await?;
        Ok(data.len() as u64)
    }

    async fn upload_file(&self, bucket: &str, key: &str, path: &Path, content_type: &str) -> StorageResult<()> {
        if self.reject_uploads {
            return Err(StorageError::upload_failed("bucket rejected the upload"));
        }
        let data = tokio::fs::read(path).await?;
        let id = (bucket.to_string(), key.to_string());
        self.content_types
            .lock()
            .unwrap()
            .insert(id.clone(), content_type.to_string());
        self.objects.lock().unwrap().insert(id, data);
        Ok(())
    }
}

/// Sampler that reads the video "duration" in seconds from the file body
/// and writes one frame per full interval, in reverse order.
#[derive(Default)]
struct DurationSampler {
    fail: bool,
    calls: AtomicUsize,
}

impl DurationSampler {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl FrameSampler for DurationSampler {
    async fn sample_frames(&self, video: &Path, output_dir: &Path, interval_secs: u32) -> MediaResult<Vec<PathBuf>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = tokio::fs::read_to_string(video).await?;
        tokio::fs::create_dir_all(output_dir).await?;

        if self.fail {
            // Leave a partial frame behind like an interrupted transcoder
            tokio::fs::write(output_dir.join("frame-0001.jpg"), b"partial").await?;
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with status 1",
                Some("Invalid data found when processing input".to_string()),
                Some(1),
            ));
        }

        let duration: u32 = body.trim().parse().map_err(|_| MediaError::internal("bad duration"))?;
        for sequence in (1..=duration / interval_secs).rev() {
            let name = format!("frame-{:04}.jpg", sequence);
            tokio::fs::write(output_dir.join(&name), format!("jpeg {}", sequence)).await?;
        }

        discover_frames(output_dir).await
    }
}

/// Notifier remembering what it was asked to send.
#[derive(Default)]
struct RecordingNotifier {
    completed: Mutex<Vec<String>>,
    failed: Mutex<Vec<FailureReport>>,
    reject: bool,
}

impl RecordingNotifier {
    fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    fn failed(&self) -> Vec<FailureReport> {
        self.failed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_completed(&self, record: &CompletionRecord) -> QueueResult<String> {
        if self.reject {
            return Err(QueueError::send_failed("vframe:done", "queue does not exist"));
        }
        let mut completed = self.completed.lock().unwrap();
        completed.push(record.to_message_body());
        Ok(format!("{}-0", completed.len()))
    }

    async fn notify_failed(&self, report: &FailureReport) -> QueueResult<String> {
        let mut failed = self.failed.lock().unwrap();
        failed.push(report.clone());
        Ok(format!("{}-0", failed.len()))
    }
}

/// Log sink shared with a test subscriber.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

struct Harness {
    work_dir: TempDir,
    store: Arc<MemoryStore>,
    sampler: Arc<DurationSampler>,
    notifier: Arc<RecordingNotifier>,
    pipeline: FramePipeline,
}

impl Harness {
    fn new(store: MemoryStore, sampler: DurationSampler, notifier: RecordingNotifier) -> Self {
        Self::with_interval(store, sampler, notifier, 30)
    }

    fn with_interval(store: MemoryStore, sampler: DurationSampler, notifier: RecordingNotifier, interval_secs: u32) -> Self {
        let work_dir = TempDir::new().unwrap();
        let store = Arc::new(store);
        let sampler = Arc::new(sampler);
        let notifier = Arc::new(notifier);

        let config = WorkerConfig {
            work_dir: work_dir.path().to_path_buf(),
            interval_secs,
            ..WorkerConfig::default()
        };
        let pipeline = FramePipeline::new(config, store.clone(), sampler.clone(), notifier.clone()).unwrap();

        Self {
            work_dir,
            store,
            sampler,
            notifier,
            pipeline,
        }
    }

    /// Entries left in the scratch root after the runs.
    fn leftover_scratch(&self) -> usize {
        std::fs::read_dir(self.work_dir.path()).unwrap().count()
    }
}

fn source(key: &str) -> SourceReference {
    SourceReference::new("src", key)
}

fn archive_entries(data: Vec<u8>) -> Vec<(String, String)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data)).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut entry = archive.by_index(i).unwrap();
            let mut content = String::new();
            entry.read_to_string(&mut content).unwrap();
            (entry.name().to_string(), content)
        })
        .collect()
}

fn expect_completed(outcome: &RecordOutcome) -> &vframe_worker::CompletedRun {
    match outcome {
        RecordOutcome::Completed(completed) => completed,
        RecordOutcome::Failed(failed) => panic!("run failed at {}: {}", failed.stage, failed.error),
    }
}

fn expect_failed(outcome: &RecordOutcome) -> &vframe_worker::FailedRun {
    match outcome {
        RecordOutcome::Failed(failed) => failed,
        RecordOutcome::Completed(completed) => panic!("run unexpectedly completed: {}", completed.archive_key),
    }
}

#[tokio::test]
async fn test_sixty_five_second_clip_end_to_end() {
    let harness = Harness::new(
        MemoryStore::default().with_object("src", "clip.mp4", b"65"),
        DurationSampler::default(),
        RecordingNotifier::default(),
    );

    let report = harness
        .pipeline
        .process_event(&TriggerEvent::for_sources([&source("clip.mp4")]))
        .await;

    assert!(report.is_success());
    assert_eq!(report.status_message(), "completed");

    let completed = expect_completed(&report.outcomes[0]);
    assert_eq!(completed.frame_count, 2);
    assert_eq!(completed.archive_key, "clip.mp4-frames.zip");

    assert_eq!(harness.store.keys_in(DEST_BUCKET), vec!["clip.mp4-frames.zip"]);
    assert_eq!(
        harness.store.content_types.lock().unwrap()[&(DEST_BUCKET.to_string(), "clip.mp4-frames.zip".to_string())],
        "application/zip"
    );

    // Frames were written in reverse; the archive is in sequence order
    let archive = harness.store.get(DEST_BUCKET, "clip.mp4-frames.zip").unwrap();
    assert_eq!(completed.archive_bytes, archive.len() as u64);
    assert_eq!(
        archive_entries(archive),
        vec![
            ("frame-0001.jpg".to_string(), "jpeg 1".to_string()),
            ("frame-0002.jpg".to_string(), "jpeg 2".to_string()),
        ]
    );

    let messages = harness.notifier.completed();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("clip.mp4;"));
    assert_eq!(messages[0].split(';').count(), 3);

    let record = CompletionRecord::from_message_body(&messages[0]).unwrap();
    assert_eq!(record.object_key, "clip.mp4");
    assert!(record.finished_at >= record.started_at);
    assert_eq!(messages[0], completed.record.to_message_body());

    assert_eq!(harness.leftover_scratch(), 0);
}

#[tokio::test]
async fn test_interval_is_passed_to_sampler() {
    let harness = Harness::with_interval(
        MemoryStore::default().with_object("src", "clip.mp4", b"65"),
        DurationSampler::default(),
        RecordingNotifier::default(),
        10,
    );
    let pipeline = harness.pipeline.with_packager(Packager::new().stored());

    let outcome = pipeline.run(&source("clip.mp4")).await;

    assert_eq!(expect_completed(&outcome).frame_count, 6);
    let archive = harness.store.get(DEST_BUCKET, "clip.mp4-frames.zip").unwrap();
    assert_eq!(archive_entries(archive).len(), 6);
}

#[tokio::test]
async fn test_transcode_failure_skips_upload_and_notification() {
    let harness = Harness::new(
        MemoryStore::default().with_object("src", "clip.mp4", b"65"),
        DurationSampler::failing(),
        RecordingNotifier::default(),
    );

    let outcome = harness.pipeline.run(&source("clip.mp4")).await;

    let failed = expect_failed(&outcome);
    assert_eq!(failed.stage, PipelineStage::Sample);
    assert!(failed.error.contains("Transcode failed"));
    assert!(harness.store.keys_in(DEST_BUCKET).is_empty());
    assert!(harness.notifier.completed().is_empty());
    // The partial frame went with the scratch directory
    assert_eq!(harness.leftover_scratch(), 0);
}

#[tokio::test]
async fn test_upload_failure_skips_notification_but_cleans_up() {
    let harness = Harness::new(
        MemoryStore::default()
            .with_object("src", "clip.mp4", b"65")
            .rejecting_uploads(),
        DurationSampler::default(),
        RecordingNotifier::default(),
    );

    let outcome = harness.pipeline.run(&source("clip.mp4")).await;

    let failed = expect_failed(&outcome);
    assert_eq!(failed.stage, PipelineStage::Upload);
    assert!(failed.error.contains("bucket rejected the upload"));
    assert!(harness.notifier.completed().is_empty());
    assert_eq!(harness.leftover_scratch(), 0);
}

#[tokio::test]
async fn test_short_video_completes_with_empty_archive() {
    let harness = Harness::new(
        MemoryStore::default().with_object("src", "short.mp4", b"10"),
        DurationSampler::default(),
        RecordingNotifier::default(),
    );

    let outcome = harness.pipeline.run(&source("short.mp4")).await;

    let completed = expect_completed(&outcome);
    assert_eq!(completed.frame_count, 0);

    let archive = harness.store.get(DEST_BUCKET, "short.mp4-frames.zip").unwrap();
    assert!(archive_entries(archive).is_empty());
    assert_eq!(harness.notifier.completed().len(), 1);
}

#[tokio::test]
async fn test_missing_source_fails_before_sampling() {
    let harness = Harness::new(MemoryStore::default(), DurationSampler::default(), RecordingNotifier::default());

    let outcome = harness.pipeline.run(&source("missing.mp4")).await;

    let failed = expect_failed(&outcome);
    assert_eq!(failed.stage, PipelineStage::Fetch);
    assert!(failed.error.contains("src/missing.mp4"));
    assert_eq!(harness.sampler.calls.load(Ordering::SeqCst), 0);
    assert!(harness.store.keys_in(DEST_BUCKET).is_empty());
    assert_eq!(harness.leftover_scratch(), 0);
}

#[tokio::test]
async fn test_notification_failure_keeps_upload() {
    let harness = Harness::new(
        MemoryStore::default().with_object("src", "clip.mp4", b"65"),
        DurationSampler::default(),
        RecordingNotifier::rejecting(),
    );

    let outcome = harness.pipeline.run(&source("clip.mp4")).await;

    let failed = expect_failed(&outcome);
    assert_eq!(failed.stage, PipelineStage::Notify);
    assert_eq!(harness.store.keys_in(DEST_BUCKET), vec!["clip.mp4-frames.zip"]);
    assert_eq!(harness.leftover_scratch(), 0);
}

#[tokio::test]
async fn test_every_record_is_processed() {
    let harness = Harness::new(
        MemoryStore::default()
            .with_object("src", "a.mp4", b"65")
            .with_object("src", "my clip.mp4", b"95"),
        DurationSampler::default(),
        RecordingNotifier::default(),
    );
    let event = TriggerEvent::for_sources([&source("a.mp4"), &source("missing.mp4"), &source("my clip.mp4")]);

    let report = harness.pipeline.process_event(&event).await;

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.completed(), 2);
    assert_eq!(report.status_message(), "completed with 1 failed records");
    assert!(!report.is_success());
    assert_eq!(expect_failed(&report.outcomes[1]).stage, PipelineStage::Fetch);
    assert_eq!(expect_completed(&report.outcomes[2]).frame_count, 3);
    assert_eq!(
        harness.store.keys_in(DEST_BUCKET),
        vec!["a.mp4-frames.zip", "my clip.mp4-frames.zip"]
    );

    let sent = route_failures(harness.notifier.as_ref(), &report).await;
    assert_eq!(sent, 1);
    let reports = harness.notifier.failed();
    assert_eq!(reports[0].object_key.as_deref(), Some("missing.mp4"));
    assert_eq!(reports[0].stage, PipelineStage::Fetch);
}

#[tokio::test]
async fn test_run_walks_every_state_in_order() {
    let harness = Harness::new(
        MemoryStore::default().with_object("src", "clip.mp4", b"65"),
        DurationSampler::default(),
        RecordingNotifier::default(),
    );
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let outcome = harness.pipeline.run(&source("clip.mp4")).await;
    assert!(outcome.is_completed());

    let logs = logs.contents();
    let positions: Vec<usize> = ["idle", "fetching", "sampling", "packaging", "publishing", "cleaning_up", "done"]
        .iter()
        .map(|state| {
            logs.find(&format!("Run stage: {}", state))
                .unwrap_or_else(|| panic!("state {} not logged in:\n{}", state, logs))
        })
        .collect();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]), "{}", logs);
}

#[tokio::test]
async fn test_abandoned_trigger_is_reported_not_rerun() {
    let harness = Harness::new(
        MemoryStore::default().with_object("src", "clip.mp4", b"65"),
        DurationSampler::default(),
        RecordingNotifier::default(),
    );
    let message = TriggerMessage {
        message_id: "1700000000000-0".to_string(),
        payload: serde_json::to_string(&TriggerEvent::for_sources([&source("clip.mp4")])).unwrap(),
    };

    let report = abandoned_report(&message);
    let sent = route_failures(harness.notifier.as_ref(), &report).await;

    assert_eq!(sent, 1);
    let reports = harness.notifier.failed();
    assert_eq!(reports[0].stage, PipelineStage::Trigger);
    assert_eq!(reports[0].object_key.as_deref(), Some("clip.mp4"));
    assert!(reports[0].error.contains("1700000000000-0"));
    assert_eq!(harness.sampler.calls.load(Ordering::SeqCst), 0);
    assert!(harness.store.keys_in(DEST_BUCKET).is_empty());

    let garbage = TriggerMessage {
        message_id: "1700000000001-0".to_string(),
        payload: "not json".to_string(),
    };
    let report = abandoned_report(&garbage);
    assert_eq!(report.failed(), 1);
    assert!(report.failures().next().unwrap().source.is_none());
}

#[tokio::test]
async fn test_empty_event() {
    let harness = Harness::new(MemoryStore::default(), DurationSampler::default(), RecordingNotifier::default());

    let report = harness.pipeline.process_event(&TriggerEvent::default()).await;

    assert!(report.is_success());
    assert_eq!(report.status_message(), "completed with no records processed");
}

#[tokio::test]
async fn test_record_without_key_is_a_trigger_failure() {
    let harness = Harness::new(
        MemoryStore::default().with_object("src", "clip.mp4", b"65"),
        DurationSampler::default(),
        RecordingNotifier::default(),
    );
    let event = TriggerEvent::parse(
        r#"{"Records":[
            {"s3":{"bucket":{"name":"src"},"object":{"key":""}}},
            {"s3":{"bucket":{"name":"src"},"object":{"key":"clip.mp4"}}}
        ]}"#,
    )
    .unwrap();

    let report = harness.pipeline.process_event(&event).await;

    assert_eq!(expect_failed(&report.outcomes[0]).stage, PipelineStage::Trigger);
    assert!(report.outcomes[1].is_completed());
}

#[tokio::test]
async fn test_event_file_round_trip() {
    let harness = Harness::new(
        MemoryStore::default().with_object("src", "clip.mp4", b"65"),
        DurationSampler::default(),
        RecordingNotifier::default(),
    );
    let event_path = harness.work_dir.path().join("event.json");
    std::fs::write(
        &event_path,
        serde_json::to_string(&TriggerEvent::for_sources([&source("clip.mp4")])).unwrap(),
    )
    .unwrap();

    let report = process_event_file(&harness.pipeline, harness.notifier.as_ref(), &event_path)
        .await
        .unwrap();

    assert!(report.is_success());
    assert!(harness.notifier.failed().is_empty());
}

#[tokio::test]
async fn test_garbage_event_file_is_reported() {
    let harness = Harness::new(MemoryStore::default(), DurationSampler::default(), RecordingNotifier::default());
    let event_path = harness.work_dir.path().join("event.json");
    std::fs::write(&event_path, "not json").unwrap();

    let report: InvocationReport = process_event_file(&harness.pipeline, harness.notifier.as_ref(), &event_path)
        .await
        .unwrap();

    assert!(!report.is_success());
    let reports = harness.notifier.failed();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].stage, PipelineStage::Trigger);
}

#[tokio::test]
async fn test_missing_event_file_is_an_error() {
    let harness = Harness::new(MemoryStore::default(), DurationSampler::default(), RecordingNotifier::default());

    let result = process_event_file(
        &harness.pipeline,
        harness.notifier.as_ref(),
        &harness.work_dir.path().join("absent.json"),
    )
    .await;

    assert!(result.is_err());
}

#[test]
fn test_pipeline_rejects_invalid_config() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::default());
    let sampler: Arc<dyn FrameSampler> = Arc::new(DurationSampler::default());
    let notifier: Arc<dyn Notifier> = Arc::new(RecordingNotifier::default());

    let zero_interval = WorkerConfig {
        interval_secs: 0,
        ..WorkerConfig::default()
    };
    let result = FramePipeline::new(zero_interval, store.clone(), sampler.clone(), notifier.clone());
    assert!(matches!(result, Err(PipelineError::Configuration(_))));

    let no_bucket = WorkerConfig {
        dest_bucket: " ".to_string(),
        ..WorkerConfig::default()
    };
    let result = FramePipeline::new(no_bucket, store, sampler, notifier);
    assert!(matches!(result, Err(PipelineError::Configuration(_))));
}
