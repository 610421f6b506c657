//! # drivehub-storage
//!
//! Blob store implementations for DriveHub. File content is addressed by an
//! opaque key; the metadata core never looks inside it.

pub mod providers;

use std::sync::Arc;

use tracing::info;

use drivehub_core::config::storage::StorageConfig;
use drivehub_core::error::AppError;
use drivehub_core::result::AppResult;
use drivehub_core::traits::storage::BlobStore;

pub use providers::{LocalBlobStore, MemoryBlobStore};

/// Build the blob store selected by configuration.
pub async fn build_blob_store(config: &StorageConfig) -> AppResult<Arc<dyn BlobStore>> {
    match config.provider.as_str() {
        "local" => {
            info!(root = %config.root_path, "Initializing local blob store");
            Ok(Arc::new(LocalBlobStore::new(&config.root_path).await?))
        }
        "memory" => {
            info!("Initializing in-memory blob store");
            Ok(Arc::new(MemoryBlobStore::new()))
        }
        other => Err(AppError::configuration(format!(
            "Unknown storage provider: '{other}'. Supported: local, memory"
        ))),
    }
}
