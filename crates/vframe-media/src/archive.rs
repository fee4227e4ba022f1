//! Frame archive packaging.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{MediaError, MediaResult};

/// Read buffer size used while copying frames into the archive.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// What ended up in a finished archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Number of entries written
    pub entries: usize,
    /// Uncompressed bytes copied from the frames
    pub input_bytes: u64,
    /// Size of the archive file on disk
    pub archive_bytes: u64,
}

/// Writes a frame set into a single zip archive.
///
/// Each frame becomes one entry named after the frame's file name. Frames are
/// copied in fixed-size chunks, so memory use does not grow with image size.
#[derive(Debug, Clone)]
pub struct Packager {
    chunk_size: usize,
    compression: CompressionMethod,
}

impl Default for Packager {
    fn default() -> Self {
        Self::new()
    }
}

impl Packager {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            compression: CompressionMethod::Deflated,
        }
    }

    /// Override the copy buffer size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Store entries without compression.
    pub fn stored(mut self) -> Self {
        self.compression = CompressionMethod::Stored;
        self
    }

    /// Package `frames` into `archive_path`, replacing any existing file.
    ///
    /// The archive is finalized (central directory written, file synced)
    /// before this returns `Ok`. On error the partial file is left for the
    /// caller to remove.
    pub async fn package(&self, frames: &[PathBuf], archive_path: &Path) -> MediaResult<ArchiveSummary> {
        let packager = self.clone();
        let frames = frames.to_vec();
        let archive_path = archive_path.to_path_buf();

        tokio::task::spawn_blocking(move || packager.write_archive(&frames, &archive_path))
            .await
            .map_err(|e| MediaError::internal(format!("Packaging task failed: {}", e)))?
    }

    fn write_archive(&self, frames: &[PathBuf], archive_path: &Path) -> MediaResult<ArchiveSummary> {
        let file = File::create(archive_path)?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let options = FileOptions::default().compression_method(self.compression);

        let mut buffer = vec![0u8; self.chunk_size];
        let mut input_bytes = 0u64;

        for frame in frames {
            let entry_name = frame
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| MediaError::internal(format!("Frame has no usable file name: {}", frame.display())))?;

            let mut input = File::open(frame).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => MediaError::FileNotFound(frame.clone()),
                _ => MediaError::Io(e),
            })?;

            zip.start_file(entry_name, options)?;

            loop {
                let read = input.read(&mut buffer)?;
                if read == 0 {
                    break;
                }
                zip.write_all(&buffer[..read])?;
                input_bytes += read as u64;
            }

            debug!("Added {} to archive", entry_name);
        }

        let mut writer = zip.finish()?;
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| MediaError::Io(e.into_error()))?;
        file.sync_all()?;

        let archive_bytes = file.metadata()?.len();

        info!(
            "Packaged {} frames ({} bytes) into {} ({} bytes)",
            frames.len(),
            input_bytes,
            archive_path.display(),
            archive_bytes
        );

        Ok(ArchiveSummary {
            entries: frames.len(),
            input_bytes,
            archive_bytes,
        })
    }
}
