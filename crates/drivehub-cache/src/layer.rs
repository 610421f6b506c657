//! Lookaside cache layer used by the services.
//!
//! The backing store is the source of truth. This layer never turns a
//! cache failure into an operation failure: reads that fail fall through
//! to the store and writes or invalidations that fail are logged.
//!
//! Fills are guarded by a generation counter. A reader takes a
//! [`FillTicket`] before it reads the store and hands it to `put*`; the
//! fill is dropped when any invalidation ran in between, so a value read
//! before a writer committed can never land after that writer's
//! invalidation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use drivehub_core::traits::cache::CacheProvider;

use crate::provider::CacheManager;

/// Invalidation generation observed by a reader before it read the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillTicket(u64);

/// TTL for a value whose underlying object expires at `expires_at`.
///
/// Returns `min(default, whole seconds left)`, or `None` when less than one
/// second is left, in which case the value must not be cached at all.
pub fn bounded_ttl(
    default: Duration,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<Duration> {
    let Some(expires_at) = expires_at else {
        return Some(default);
    };
    let remaining = (expires_at - now).num_seconds();
    if remaining < 1 {
        return None;
    }
    Some(default.min(Duration::from_secs(remaining.unsigned_abs())))
}

/// Typed, failure-tolerant front for the [`CacheManager`].
#[derive(Debug, Clone)]
pub struct CacheLayer {
    cache: Arc<CacheManager>,
    default_ttl: Duration,
    /// Bumped by every invalidation. Fills hold the read side while they
    /// write, invalidations hold the write side while they delete.
    generation: Arc<RwLock<u64>>,
}

impl CacheLayer {
    /// Create a new cache layer.
    pub fn new(cache: Arc<CacheManager>, default_ttl: Duration) -> Self {
        Self {
            cache,
            default_ttl,
            generation: Arc::new(RwLock::new(0)),
        }
    }

    /// Take a ticket for a later fill. Call it before reading the store.
    pub async fn ticket(&self) -> FillTicket {
        FillTicket(*self.generation.read().await)
    }

    /// The TTL used by [`put`](Self::put).
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Read a typed value. Misses, errors and undecodable values all
    /// return `None`.
    pub async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Option<T> {
        match self.cache.get_json::<T>(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, falling back to store");
                None
            }
        }
    }

    /// Read several typed values in one round trip, aligned with `keys`.
    pub async fn get_many<T: DeserializeOwned>(&self, keys: &[String]) -> Vec<Option<T>> {
        if keys.is_empty() {
            return Vec::new();
        }
        match self.cache.get_many(keys).await {
            Ok(raw) => raw
                .into_iter()
                .zip(keys)
                .map(|(value, key)| {
                    let value = value?;
                    match serde_json::from_str(&value) {
                        Ok(parsed) => Some(parsed),
                        Err(e) => {
                            warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                            None
                        }
                    }
                })
                .collect(),
            Err(e) => {
                warn!(count = keys.len(), error = %e, "Cache multi-read failed, falling back to store");
                keys.iter().map(|_| None).collect()
            }
        }
    }

    /// Store a value with the default TTL.
    pub async fn put<T: Serialize + Send + Sync>(
        &self,
        ticket: FillTicket,
        key: &str,
        value: &T,
    ) -> bool {
        self.put_for(ticket, key, value, self.default_ttl).await
    }

    /// Store a value with an explicit TTL.
    ///
    /// Returns `false` when the fill was dropped because an invalidation
    /// ran since `ticket` was taken.
    pub async fn put_for<T: Serialize + Send + Sync>(
        &self,
        ticket: FillTicket,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> bool {
        let generation = self.generation.read().await;
        if *generation != ticket.0 {
            debug!(key, "Cache fill dropped, invalidated while loading");
            return false;
        }
        if let Err(e) = self.cache.set_json(key, value, ttl).await {
            warn!(key, error = %e, "Cache write failed");
        }
        true
    }

    /// Store a value that must not outlive `expires_at`.
    ///
    /// The TTL is `ttl` capped by [`bounded_ttl`]. Returns `false` when the
    /// value was not cached, either because too little time is left or
    /// because the fill was invalidated.
    pub async fn put_bounded<T: Serialize + Send + Sync>(
        &self,
        ticket: FillTicket,
        key: &str,
        value: &T,
        ttl: Duration,
        expires_at: Option<DateTime<Utc>>,
    ) -> bool {
        match bounded_ttl(ttl, expires_at, Utc::now()) {
            Some(ttl) => self.put_for(ticket, key, value, ttl).await,
            None => false,
        }
    }

    /// Drop one key.
    pub async fn invalidate(&self, key: &str) {
        let mut generation = self.generation.write().await;
        *generation += 1;
        if let Err(e) = self.cache.delete(key).await {
            warn!(key, error = %e, "Cache invalidation failed");
        }
    }

    /// Drop every key starting with `prefix`.
    pub async fn invalidate_prefix(&self, prefix: &str) {
        let mut generation = self.generation.write().await;
        *generation += 1;
        if let Err(e) = self.cache.delete_prefix(prefix).await {
            warn!(prefix, error = %e, "Cache prefix invalidation failed");
        }
    }
}
