//! In-memory object store.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{StorageError, StorageResult};
use crate::store::ObjectStore;

/// Object store held in process memory.
///
/// Buckets are created on first write unless the store was built with a
/// fixed bucket list, in which case writes to other buckets fail with
/// `BucketNotFound` like a real store would.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<(String, String), Vec<u8>>>,
    buckets: Option<HashSet<String>>,
    fail_puts: AtomicBool,
    puts: AtomicUsize,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept writes to the given buckets.
    pub fn with_buckets<I, S>(buckets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            buckets: Some(buckets.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Make every subsequent put fail with `UploadFailed`.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Number of successful puts.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Stored bytes for `bucket/key`.
    pub async fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Keys stored in `bucket`, sorted.
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .read()
            .await
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Total number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn check_bucket(&self, bucket: &str) -> StorageResult<()> {
        match &self.buckets {
            Some(known) if !known.contains(bucket) => {
                Err(StorageError::BucketNotFound(bucket.to_string()))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, local_path: &Path) -> StorageResult<()> {
        self.check_bucket(bucket)?;
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::upload_failed(format!(
                "injected failure for {}/{}",
                bucket, key
            )));
        }

        let data = tokio::fs::read(local_path).await?;
        self.objects
            .write()
            .await
            .insert((bucket.to_string(), key.to_string()), data);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str, local_path: &Path) -> StorageResult<()> {
        self.check_bucket(bucket)?;
        let data = self
            .object(bucket, key)
            .await
            .ok_or_else(|| StorageError::not_found(format!("{}/{}", bucket, key)))?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, data).await?;
        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        self.check_bucket(bucket)?;
        Ok(self.object(bucket, key).await.is_some())
    }
}
