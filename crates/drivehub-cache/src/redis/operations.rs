//! Redis cache provider implementation.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use drivehub_core::config::cache::RedisCacheConfig;
use drivehub_core::error::{AppError, ErrorKind};
use drivehub_core::result::AppResult;
use drivehub_core::traits::cache::CacheProvider;

/// Keys fetched per `SCAN` round trip.
const SCAN_BATCH: u32 = 500;

/// Redis-backed cache provider.
///
/// Every key is stored under the configured namespace, so several
/// deployments can share one Redis and a prefix sweep never reaches
/// another deployment's entries.
#[derive(Debug, Clone)]
pub struct RedisCacheProvider {
    /// Reconnecting multiplexed connection.
    conn: ConnectionManager,
    namespace: String,
}

impl RedisCacheProvider {
    /// Connect to the configured Redis.
    pub async fn connect(config: &RedisCacheConfig) -> AppResult<Self> {
        info!(url = %redact_userinfo(&config.url), namespace = %config.key_prefix, "Connecting to Redis");

        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            AppError::with_source(ErrorKind::Configuration, "Invalid Redis URL", e)
        })?;
        let conn = ConnectionManager::new(client).await.map_err(Self::map_err)?;

        info!("Connected to Redis");
        Ok(Self {
            conn,
            namespace: config.key_prefix.clone(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.namespace)
    }

    /// Map a Redis error to an AppError.
    fn map_err(e: redis::RedisError) -> AppError {
        AppError::with_source(ErrorKind::TransientStore, format!("Redis error: {e}"), e)
    }
}

#[async_trait]
impl CacheProvider for RedisCacheProvider {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();
        let result: Option<String> = conn.get(&full_key).await.map_err(Self::map_err)?;
        Ok(result)
    }

    async fn get_many(&self, keys: &[String]) -> AppResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let full_keys: Vec<String> = keys.iter().map(|k| self.key(k)).collect();
        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&full_keys)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(values)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();
        // SETEX rejects a zero expiry.
        let seconds = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(&full_key, value, seconds)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();
        let _: () = conn.del(&full_key).await.map_err(Self::map_err)?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> AppResult<u64> {
        let pattern = scan_pattern(&self.namespace, prefix);
        let mut conn = self.conn.clone();

        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(Self::map_err)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        if keys.is_empty() {
            return Ok(0);
        }

        let count: u64 = redis::cmd("DEL")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;

        debug!(prefix, count, "Deleted keys with prefix");
        Ok(count)
    }

    async fn health_check(&self) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(pong == "PONG")
    }
}

/// `SCAN MATCH` pattern for every key starting with `prefix` inside
/// `namespace`. Glob metacharacters in either part match literally.
fn scan_pattern(namespace: &str, prefix: &str) -> String {
    let mut pattern = String::with_capacity(namespace.len() + prefix.len() + 1);
    for c in namespace.chars().chain(prefix.chars()) {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

/// Drop the credentials from a connection URL before logging it.
fn redact_userinfo(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => match rest.rsplit_once('@') {
            Some((_, host)) => format!("{scheme}://***@{host}"),
            None => url.to_string(),
        },
        None => url.to_string(),
    }
}
