//! Shared fixtures for unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use drivehub_cache::{CacheLayer, CacheManager};
use drivehub_core::config::cache::CacheConfig;
use drivehub_core::events::{AuditAction, AuditEvent};
use drivehub_core::traits::audit::AuditSink;
use drivehub_database::MemoryMetadataStore;
use drivehub_storage::providers::memory::MemoryBlobStore;

use crate::lock::OperationSerializer;
use crate::node::NodeService;
use crate::settings::SettingsService;
use crate::share::{AccessService, ShareService, TokenGenerator};

/// Audit sink that keeps every event.
#[derive(Debug, Default)]
pub(crate) struct RecordingAudit {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAudit {
    pub(crate) fn actions(&self) -> Vec<AuditAction> {
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

/// Every service wired over in-memory backends.
pub(crate) struct Harness {
    pub(crate) store: MemoryMetadataStore,
    pub(crate) blobs: Arc<MemoryBlobStore>,
    pub(crate) cache: CacheLayer,
    pub(crate) audit: Arc<RecordingAudit>,
    pub(crate) nodes: NodeService,
    pub(crate) shares: ShareService,
    pub(crate) access: AccessService,
    pub(crate) settings: SettingsService,
}

impl Harness {
    pub(crate) async fn new() -> Self {
        let store = MemoryMetadataStore::new();
        let blobs = Arc::new(MemoryBlobStore::new());
        let manager = CacheManager::new(&CacheConfig::default())
            .await
            .expect("memory cache");
        let cache = CacheLayer::new(Arc::new(manager), Duration::from_secs(300));
        let audit = Arc::new(RecordingAudit::default());
        let locks = Arc::new(OperationSerializer::new());
        let repo = Arc::new(store.clone());

        let nodes = NodeService::new(
            repo.clone(),
            repo.clone(),
            blobs.clone(),
            cache.clone(),
            locks.clone(),
            audit.clone(),
        );
        let shares = ShareService::new(
            repo.clone(),
            repo.clone(),
            cache.clone(),
            locks.clone(),
            audit.clone(),
            TokenGenerator::default(),
        );
        let access = AccessService::new(repo.clone(), repo.clone(), cache.clone(), Duration::from_secs(60));
        let settings = SettingsService::new(repo, locks, audit.clone());

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
}
