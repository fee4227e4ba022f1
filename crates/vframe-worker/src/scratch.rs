//! Per-run scratch space and best-effort cleanup.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use vframe_models::{RunId, SourceReference};

/// Extension used when the source key has none we can reuse.
const FALLBACK_EXTENSION: &str = "bin";

/// Private scratch layout of one run:
///
/// ```text
/// <work_dir>/<run_id>/
///     source.<ext>
///     frames/frame-0001.jpg ...
///     frames.zip
/// ```
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    root: PathBuf,
    video: PathBuf,
    frames_dir: PathBuf,
    archive: PathBuf,
}

impl ScratchSpace {
    pub fn for_run(work_dir: &Path, run_id: &RunId, source: &SourceReference) -> Self {
        let root = work_dir.join(run_id.as_str());
        let extension = source
            .extension()
            .filter(|ext| ext.len() <= 16 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or(FALLBACK_EXTENSION);

        Self {
            video: root.join(format!("source.{}", extension)),
            frames_dir: root.join("frames"),
            archive: root.join("frames.zip"),
            root,
        }
    }

    /// Create the run directory.
    pub async fn prepare(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the downloaded video is written.
    pub fn video_path(&self) -> &Path {
        &self.video
    }

    /// Directory the transcoder writes frames into.
    pub fn frames_dir(&self) -> &Path {
        &self.frames_dir
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive
    }
}

/// What one cleanup pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    /// Files and directories actually removed
    pub removed: usize,
    /// Removals that failed for a reason other than absence
    pub failed: usize,
}

/// Removes the scratch artifacts of a run.
///
/// Never fails. Missing artifacts are not errors, so reaping the same run
/// twice is harmless.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reaper;

impl Reaper {
    pub fn new() -> Self {
        Self
    }

    /// Delete the video, every frame, the archive and finally the run
    /// directories. Frames the transcoder left behind without being listed
    /// (a failed run) go with the frames directory.
    pub async fn reap(&self, scratch: &ScratchSpace, frames: &[PathBuf]) -> CleanupSummary {
        let mut summary = CleanupSummary::default();

        let files = std::iter::once(scratch.video_path())
            .chain(frames.iter().map(PathBuf::as_path))
            .chain(std::iter::once(scratch.archive_path()));

        for path in files {
            summary.record(path, tokio::fs::remove_file(path).await);
        }

        summary.record(scratch.frames_dir(), tokio::fs::remove_dir_all(scratch.frames_dir()).await);
        summary.record(scratch.root(), tokio::fs::remove_dir_all(scratch.root()).await);

        debug!(
            removed = summary.removed,
            failed = summary.failed,
            "Reaped scratch space {}",
            scratch.root().display()
        );
        summary
    }
}

impl CleanupSummary {
    fn record(&mut self, path: &Path, result: std::io::Result<()>) {
        match result {
            Ok(()) => self.removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                self.failed += 1;
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }
}
