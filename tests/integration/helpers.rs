//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Notify;
use uuid::Uuid;

use drivehub_cache::{CacheLayer, CacheManager};
use drivehub_core::config::cache::CacheConfig;
use drivehub_core::config::share::ShareConfig;
use drivehub_core::events::{AuditAction, AuditEvent};
use drivehub_core::traits::audit::AuditSink;
use drivehub_core::traits::storage::BlobStore;
use drivehub_database::{MemoryMetadataStore, NodeRepository, ShareRepository};
use drivehub_entity::file::FileNode;
use drivehub_service::{AccessService, NodeService, SettingsService, ShareService};
use drivehub_storage::MemoryBlobStore;

use drivehub::{Repositories, Services};

/// Audit sink that keeps every event for assertions.
#[derive(Debug, Default)]
pub struct RecordingAudit {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAudit {
    /// Actions recorded so far, oldest first.
    pub fn actions(&self) -> Vec<AuditAction> {
        self.events
            .lock()
            .map(|events| events.iter().map(|e| e.action).collect())
            .unwrap_or_default()
    }
}

impl AuditSink for RecordingAudit {
    fn record(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Holds one repository call in place after its read until released.
#[derive(Debug, Default)]
pub struct Gate {
    armed: AtomicBool,
    reached: Notify,
    release: Notify,
}

impl Gate {
    /// Pause the next call that passes through the gate.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Called by the wrapped repository once its read has completed.
    pub async fn pass(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.reached.notify_one();
            self.release.notified().await;
        }
    }

    /// Wait until a call is parked at the gate.
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    /// Let the parked call continue.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// Test application context
pub struct TestApp {
    /// The in-memory metadata store behind every repository
    pub store: MemoryMetadataStore,
    /// Blob store
    pub blobs: Arc<dyn BlobStore>,
    /// Cache layer shared by all services
    pub cache: CacheLayer,
    /// Captured audit events
    pub audit: Arc<RecordingAudit>,
    /// Tree operations
    pub nodes: Arc<NodeService>,
    /// Share registry
    pub shares: Arc<ShareService>,
    /// Public share access
    pub access: Arc<AccessService>,
    /// System settings
    pub settings: Arc<SettingsService>,
}

impl TestApp {
    /// Create a new test application over in-memory backends
    pub async fn new() -> Self {
        let store = MemoryMetadataStore::new();
        let repo = Arc::new(store.clone());
        Self::build(store, repo.clone(), repo, Arc::new(MemoryBlobStore::new())).await
    }

    /// Create a test application with substitute repositories or blob store
    pub async fn build(
        store: MemoryMetadataStore,
        nodes_repo: Arc<dyn NodeRepository>,
        shares_repo: Arc<dyn ShareRepository>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let manager = CacheManager::new(&CacheConfig::default())
            .await
            .expect("Failed to init cache");
        let cache = CacheLayer::new(Arc::new(manager), Duration::from_secs(300));
        let audit = Arc::new(RecordingAudit::default());
        let repos = Repositories {
            nodes: nodes_repo,
            shares: shares_repo,
            settings: Arc::new(store.clone()),
        };
        let Services {
            nodes,
            shares,
            access,
            settings,
        } = Services::new(
            repos,
            blobs.clone(),
            cache.clone(),
            audit.clone(),
            &ShareConfig::default(),
        );

        Self {
            store,
            blobs,
            cache,
            audit,
            nodes,
            shares,
            access,
            settings,
        }
    }

    /// Create a folder, panicking on failure
    pub async fn folder(&self, owner: Uuid, name: &str, parent: Option<Uuid>) -> FileNode {
        self.nodes
            .create_folder(owner, name, parent)
            .await
            .expect("Failed to create folder")
    }

    /// Upload a file, panicking on failure
    pub async fn file(
        &self,
        owner: Uuid,
        name: &str,
        content: &'static [u8],
        parent: Option<Uuid>,
    ) -> FileNode {
        self.nodes
            .upload(owner, name, None, Bytes::from_static(content), parent)
            .await
            .expect("Failed to upload file")
    }
}
