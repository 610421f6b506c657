//! PostgreSQL connection pool.
//!
//! Repository calls are bounded twice: client side by a per-call timeout
//! and server side by a `statement_timeout` set on every pooled session,
//! so a call abandoned by the client does not keep running in the database.

use std::time::Duration;

use sqlx::Executor;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use drivehub_core::config::database::DatabaseConfig;
use drivehub_core::result::AppResult;

use crate::timeout::db_error;

/// Shared pool of PostgreSQL sessions for the metadata repositories.
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Open the pool and prepare each new session for repository use.
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        let setup = session_setup_sql(config);
        info!(
            url = %mask_password(&config.url),
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            statement_timeout_ms = config.statement_timeout_ms,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .test_before_acquire(true)
            .after_connect(move |conn, _meta| {
                let setup = setup.clone();
                Box::pin(async move {
                    conn.execute(setup.as_str()).await?;
                    debug!("Metadata session prepared");
                    Ok(())
                })
            })
            .connect(&config.url)
            .await
            .map_err(|e| db_error("Failed to connect to database", e))?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// The underlying sqlx pool handed to the repositories.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trip a trivial query.
    pub async fn health_check(&self) -> AppResult<bool> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|v| v == 1)
            .map_err(|e| db_error("Database health check failed", e))
    }

    /// Close every session in the pool.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}

/// Statement run on every new session. A zero timeout would disable the
/// server-side limit, so it is raised to one millisecond.
fn session_setup_sql(config: &DatabaseConfig) -> String {
    format!(
        "SET statement_timeout = {}",
        config.statement_timeout_ms.max(1)
    )
}

/// Hide the password of a connection URL for logging.
fn mask_password(url: &str) -> String {
    let Some((head, host)) = url.rsplit_once('@') else {
        return url.to_string();
    };
    let userinfo_start = head.find("://").map_or(0, |p| p + 3);
    match head[userinfo_start..].split_once(':') {
        Some((user, _)) => format!("{}{user}:****@{host}", &head[..userinfo_start]),
        None => url.to_string(),
    }
}
