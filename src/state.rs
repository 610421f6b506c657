//! Services of one DriveHub process over shared infrastructure.

use std::sync::Arc;
use std::time::Duration;

use drivehub_cache::CacheLayer;
use drivehub_core::config::share::ShareConfig;
use drivehub_core::traits::audit::AuditSink;
use drivehub_core::traits::storage::BlobStore;
use drivehub_database::{
    DatabasePool, NodeRepository, PgNodeRepository, PgSettingsRepository, PgShareRepository,
    SettingsRepository, ShareRepository,
};
use drivehub_service::{
    AccessService, NodeService, OperationSerializer, SettingsService, ShareService, TokenGenerator,
};

/// Metadata repositories the services run on.
#[derive(Clone)]
pub struct Repositories {
    /// File tree
    pub nodes: Arc<dyn NodeRepository>,
    /// Share links and memberships
    pub shares: Arc<dyn ShareRepository>,
    /// System settings row
    pub settings: Arc<dyn SettingsRepository>,
}

impl Repositories {
    /// PostgreSQL repositories over one pool, each statement bounded by
    /// `timeout`.
    pub fn postgres(db: &DatabasePool, timeout: Duration) -> Self {
        Self {
            nodes: Arc::new(PgNodeRepository::new(db.pool().clone(), timeout)),
            shares: Arc::new(PgShareRepository::new(db.pool().clone(), timeout)),
            settings: Arc::new(PgSettingsRepository::new(db.pool().clone(), timeout)),
        }
    }
}

/// Every service the process exposes.
///
/// All services share one cache layer and one operation serializer, so a
/// mutation through any of them invalidates and locks consistently with
/// the others.
#[derive(Clone)]
pub struct Services {
    // ── Owner-facing ─────────────────────────────────────────
    /// Tree operations
    pub nodes: Arc<NodeService>,
    /// Share registry
    pub shares: Arc<ShareService>,

    // ── Public ───────────────────────────────────────────────
    /// Token-based share access
    pub access: Arc<AccessService>,

    // ── System ───────────────────────────────────────────────
    /// Admin claim and signup toggle
    pub settings: Arc<SettingsService>,
}

impl Services {
    /// Wire the services over `repos`.
    pub fn new(
        repos: Repositories,
        blobs: Arc<dyn BlobStore>,
        cache: CacheLayer,
        audit: Arc<dyn AuditSink>,
        share: &ShareConfig,
    ) -> Self {
        let locks = Arc::new(OperationSerializer::new());

        let nodes = Arc::new(NodeService::new(
            repos.nodes.clone(),
            repos.shares.clone(),
            blobs,
            cache.clone(),
            Arc::clone(&locks),
            audit.clone(),
        ));
        let shares = Arc::new(ShareService::new(
            repos.nodes.clone(),
            repos.shares.clone(),
            cache.clone(),
            Arc::clone(&locks),
            audit.clone(),
            TokenGenerator::new(share.token_bytes),
        ));
        let access = Arc::new(AccessService::new(
            repos.nodes,
            repos.shares,
            cache,
            Duration::from_secs(share.listing_cache_ttl_seconds),
        ));
        let settings = Arc::new(SettingsService::new(repos.settings, locks, audit));

        Self {
            nodes,
            shares,
            access,
            settings,
        }
    }
}
