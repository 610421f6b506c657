//! In-memory blob store.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use drivehub_core::error::AppError;
use drivehub_core::result::AppResult;
use drivehub_core::traits::storage::BlobStore;

/// Blob store held in a concurrent map. Clones share the same blobs.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<DashMap<String, Bytes>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Whether the store holds no blobs.
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn provider_type(&self) -> &str {
        "memory"
    }

    async fn read_bytes(&self, key: &str) -> AppResult<Bytes> {
        self.blobs
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::not_found(format!("Blob not found: {key}")))
    }

    async fn write(&self, key: &str, data: Bytes) -> AppResult<()> {
        self.blobs.insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.blobs.remove(key);
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> AppResult<()> {
        let data = self.read_bytes(from).await?;
        self.blobs.insert(to.to_string(), data);
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.blobs.contains_key(key))
    }
}
