//! Frame naming and archive key conventions.

/// Default spacing between sampled frames.
pub const DEFAULT_INTERVAL_SECS: u32 = 30;

/// Sampled frame file names: `frame-0001.jpg`, `frame-0002.jpg`, ...
pub const FRAME_PREFIX: &str = "frame-";
pub const FRAME_EXTENSION: &str = "jpg";
/// Output pattern handed to the transcoder.
pub const FRAME_OUTPUT_PATTERN: &str = "frame-%04d.jpg";

/// Suffix appended to the source object key for the uploaded archive.
pub const ARCHIVE_SUFFIX: &str = "-frames.zip";
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Destination key for the archive built from `source_key`.
pub fn archive_key(source_key: &str) -> String {
    format!("{}{}", source_key, ARCHIVE_SUFFIX)
}

/// Sequence number embedded in a sampled frame file name.
///
/// Returns `None` for names that do not follow the frame pattern.
pub fn frame_sequence(file_name: &str) -> Option<u32> {
    let digits = file_name
        .strip_prefix(FRAME_PREFIX)?
        .strip_suffix(FRAME_EXTENSION)?
        .strip_suffix('.')?;

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    digits.parse().ok()
}
