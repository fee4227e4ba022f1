//! Periodic frame sampling.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};
use vframe_models::frames::{frame_sequence, FRAME_OUTPUT_PATTERN};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Extracts still frames from a video at a fixed interval.
#[async_trait]
pub trait FrameSampler: Send + Sync {
    /// Write one image per `interval_secs` of `video` into `output_dir`.
    ///
    /// Returns the produced frames ordered by their sequence number. An empty
    /// result is valid (video shorter than the first sample point).
    async fn sample_frames(
        &self,
        video: &Path,
        output_dir: &Path,
        interval_secs: u32,
    ) -> MediaResult<Vec<PathBuf>>;
}

/// Frame sampler backed by the FFmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegFrameSampler {
    runner: FfmpegRunner,
}

impl FfmpegFrameSampler {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            runner: FfmpegRunner::new(binary),
        }
    }
}

#[async_trait]
impl FrameSampler for FfmpegFrameSampler {
    async fn sample_frames(
        &self,
        video: &Path,
        output_dir: &Path,
        interval_secs: u32,
    ) -> MediaResult<Vec<PathBuf>> {
        if interval_secs == 0 {
            return Err(MediaError::InvalidInterval);
        }
        if !video.exists() {
            return Err(MediaError::FileNotFound(video.to_path_buf()));
        }

        tokio::fs::create_dir_all(output_dir).await?;

        let cmd = FfmpegCommand::new(video, output_dir.join(FRAME_OUTPUT_PATTERN))
            .sample_every(interval_secs);

        // The frame count comes from the directory, not from ffmpeg's report
        let progress = self.runner.run(&cmd).await?;
        debug!(
            reported_frames = progress.frame,
            out_time_secs = progress.out_time_secs(),
            "FFmpeg sampling finished"
        );

        let frames = discover_frames(output_dir).await?;
        info!(
            "Sampled {} frames from {} every {}s",
            frames.len(),
            video.display(),
            interval_secs
        );

        Ok(frames)
    }
}

/// List the sampled frame files in `dir`, ordered by sequence number.
///
/// Files that do not follow the frame naming pattern are ignored.
pub async fn discover_frames(dir: &Path) -> MediaResult<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut frames = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }

        let name = entry.file_name();
        if let Some(sequence) = name.to_str().and_then(frame_sequence) {
            frames.push((sequence, entry.path()));
        }
    }

    // Directory listing order is arbitrary
    frames.sort_by_key(|(sequence, _)| *sequence);

    Ok(frames.into_iter().map(|(_, path)| path).collect())
}
