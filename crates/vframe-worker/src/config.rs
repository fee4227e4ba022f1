//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use vframe_models::DEFAULT_INTERVAL_SECS;

use crate::error::{WorkerError, WorkerResult};

/// Default bucket receiving frame archives.
pub const DEFAULT_DEST_BUCKET: &str = "vframe-archives";

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Scratch root; each run gets its own directory below it
    pub work_dir: PathBuf,
    /// Seconds between sampled frames
    pub interval_secs: u32,
    /// Bucket receiving the frame archives
    pub dest_bucket: String,
    /// Explicit transcoder binary, otherwise resolved from PATH
    pub ffmpeg_path: Option<String>,
    /// Prometheus listener address
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/vframe"),
            interval_secs: DEFAULT_INTERVAL_SECS,
            dest_bucket: DEFAULT_DEST_BUCKET.to_string(),
            ffmpeg_path: None,
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from an arbitrary variable lookup.
    ///
    /// Unset or blank variables fall back to defaults; present but
    /// unparseable values are rejected instead of silently ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> WorkerResult<Self> {
        let defaults = Self::default();
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let interval_secs = match var("VFRAME_INTERVAL_SECS") {
            Some(raw) => match raw.parse::<u32>() {
                Ok(0) | Err(_) => {
                    return Err(WorkerError::config_error(format!(
                        "VFRAME_INTERVAL_SECS must be a positive number of seconds, got '{}'",
                        raw
                    )))
                }
                Ok(secs) => secs,
            },
            None => defaults.interval_secs,
        };

        let metrics_addr = match var("METRICS_ADDR") {
            Some(raw) => Some(raw.parse::<SocketAddr>().map_err(|e| {
                WorkerError::config_error(format!("METRICS_ADDR '{}' is not a socket address: {}", raw, e))
            })?),
            None => None,
        };

        Ok(Self {
            work_dir: var("VFRAME_WORK_DIR").map(PathBuf::from).unwrap_or(defaults.work_dir),
            interval_secs,
            dest_bucket: var("VFRAME_DEST_BUCKET").unwrap_or(defaults.dest_bucket),
            ffmpeg_path: var("FFMPEG_PATH"),
            metrics_addr,
        })
    }
}
