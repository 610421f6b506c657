//! Blob store trait for file content.

use async_trait::async_trait;
use bytes::Bytes;

use crate::result::AppResult;

/// Opaque content store addressed by a string key.
///
/// The metadata core never interprets the key; it only stores it in
/// `FileNode::storage_ref` and hands it back here. Implementations live in
/// `drivehub-storage`.
#[async_trait]
pub trait BlobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Return the provider type name (e.g., "local", "memory").
    fn provider_type(&self) -> &str;

    /// Read a blob into memory.
    async fn read_bytes(&self, key: &str) -> AppResult<Bytes>;

    /// Write a blob, replacing any existing content.
    async fn write(&self, key: &str, data: Bytes) -> AppResult<()>;

    /// Delete a blob. Deleting a missing blob is not an error.
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Copy a blob to a new key.
    async fn copy(&self, from: &str, to: &str) -> AppResult<()>;

    /// Check whether a blob exists.
    async fn exists(&self, key: &str) -> AppResult<bool>;
}
