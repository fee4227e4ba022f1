//! FFmpeg frame sampling and archive packaging.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - The `FrameSampler` capability and its FFmpeg implementation
//! - Ordered discovery of sampled frame files
//! - Zip packaging of a frame set with bounded memory use

pub mod archive;
pub mod command;
pub mod error;
pub mod progress;
pub mod sampler;

pub use archive::{ArchiveSummary, Packager, DEFAULT_CHUNK_SIZE};
pub use command::{resolve_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use progress::FfmpegProgress;
pub use sampler::{discover_frames, FfmpegFrameSampler, FrameSampler};
