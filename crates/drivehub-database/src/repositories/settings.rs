//! System settings repository.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use drivehub_core::result::AppResult;
use drivehub_entity::settings::SystemSettings;

use crate::timeout::{bounded, db_error};

/// Storage operations on the single-row `system_settings` table.
#[async_trait]
pub trait SettingsRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Load the settings row.
    async fn get(&self) -> AppResult<SystemSettings>;

    /// Set the administrator if and only if none is set yet.
    ///
    /// Returns `true` when this call claimed the role. The check and the
    /// write are one conditional statement.
    async fn claim_admin(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<bool>;

    /// Enable or disable signups.
    async fn set_signups_enabled(
        &self,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> AppResult<SystemSettings>;
}

/// PostgreSQL implementation of [`SettingsRepository`].
#[derive(Debug, Clone)]
pub struct PgSettingsRepository {
    pool: PgPool,
    timeout: Duration,
}

impl PgSettingsRepository {
    /// Create a new settings repository.
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl SettingsRepository for PgSettingsRepository {
    async fn get(&self) -> AppResult<SystemSettings> {
        bounded(self.timeout, "load settings", async {
            sqlx::query_as::<_, SystemSettings>("SELECT * FROM system_settings WHERE id = 1")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_error("Failed to load system settings", e))
        })
        .await
    }

    async fn claim_admin(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        bounded(self.timeout, "claim admin", async {
            let result = sqlx::query(
                "UPDATE system_settings SET admin_user_id = $1, updated_at = $2 \
                 WHERE id = 1 AND admin_user_id IS NULL",
            )
            .bind(user_id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to claim admin", e))?;
            Ok(result.rows_affected() == 1)
        })
        .await
    }

    async fn set_signups_enabled(
        &self,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> AppResult<SystemSettings> {
        bounded(self.timeout, "update settings", async {
            sqlx::query_as::<_, SystemSettings>(
                "UPDATE system_settings SET signups_enabled = $1, updated_at = $2 \
                 WHERE id = 1 RETURNING *",
            )
            .bind(enabled)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to update system settings", e))
        })
        .await
    }
}
