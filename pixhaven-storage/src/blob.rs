//! Object store contract for image bytes.

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::try_join_all;
use pixhaven_core::BlobError;
use std::sync::atomic::{AtomicU64, Ordering};

/// Durable object store. Deletes are idempotent: removing an absent key succeeds.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError>;

    async fn delete(&self, key: &str) -> Result<(), BlobError>;

    /// Delete several keys concurrently. Fails if any single delete fails.
    async fn delete_many(&self, keys: &[String]) -> Result<(), BlobError> {
        try_join_all(keys.iter().map(|key| self.delete(key))).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// In-memory object store.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    objects: DashMap<String, StoredBlob>,
    deletes: AtomicU64,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<StoredBlob> {
        self.objects.get(key).map(|blob| blob.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Delete calls that actually removed an object.
    pub fn effective_deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError> {
        if key.is_empty() {
            return Err(BlobError::PutFailed {
                key: String::new(),
                reason: "empty key".to_string(),
            });
        }
        self.objects.insert(
            key.to_string(),
            StoredBlob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        if self.objects.remove(key).is_some() {
            self.deletes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}
