//! Object store capability.

use std::path::Path;

use async_trait::async_trait;

use crate::error::StorageResult;

/// Read/write access to object containers.
///
/// The pipeline only ever needs these two operations; implementations are
/// constructed once and shared between runs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stream `bucket/key` into a local file, replacing anything at `path`.
    ///
    /// Returns the number of bytes written.
    async fn download_to_file(&self, bucket: &str, key: &str, path: &Path) -> StorageResult<u64>;

    /// Store the local file at `path` as `bucket/key`.
    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> StorageResult<()>;
}
