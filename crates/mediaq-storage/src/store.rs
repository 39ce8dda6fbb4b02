//! The object store seam.

use std::path::Path;

use async_trait::async_trait;

use crate::error::StorageResult;

/// Bucket/key object storage.
///
/// Puts are atomic per key and overwrite; no versioning is assumed.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file to `bucket/key`.
    async fn put_object(&self, bucket: &str, key: &str, local_path: &Path) -> StorageResult<()>;

    /// Download `bucket/key` to a local file, creating its parent directory.
    async fn get_object(&self, bucket: &str, key: &str, local_path: &Path) -> StorageResult<()>;

    /// Check whether `bucket/key` exists.
    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool>;
}

/// Content type for an uploaded artifact, by extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}
