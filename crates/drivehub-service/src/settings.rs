//! System-wide settings.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use drivehub_core::events::{AuditAction, AuditEvent};
use drivehub_core::result::AppResult;
use drivehub_core::traits::audit::AuditSink;
use drivehub_core::types::LockKey;
use drivehub_database::SettingsRepository;
use drivehub_entity::settings::SystemSettings;

use crate::lock::OperationSerializer;
use crate::retry::read_retry;
use crate::time::now;

/// Reads and updates the single settings row.
#[derive(Debug, Clone)]
pub struct SettingsService {
    /// Settings repository.
    settings: Arc<dyn SettingsRepository>,
    /// Operation locks.
    locks: Arc<OperationSerializer>,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
}

impl SettingsService {
    /// Creates a new settings service.
    pub fn new(
        settings: Arc<dyn SettingsRepository>,
        locks: Arc<OperationSerializer>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            settings,
            locks,
            audit,
        }
    }

    /// Current settings.
    pub async fn settings(&self) -> AppResult<SystemSettings> {
        read_retry("read settings", || self.settings.get()).await
    }

    /// Make `user_id` the administrator if nobody is yet.
    ///
    /// Decided by one conditional write in the store, so exactly one of
    /// any number of concurrent callers, on any replica, gets `true`.
    pub async fn claim_admin(&self, user_id: Uuid) -> AppResult<bool> {
        let claimed = self.settings.claim_admin(user_id, now()).await?;
        if claimed {
            info!(user_id = %user_id, "Administrator claimed");
            self.audit
                .record(AuditEvent::success(AuditAction::AdminClaimed, user_id.to_string()).by(user_id));
        }
        Ok(claimed)
    }

    /// Turn self-service signups on or off.
    pub async fn set_signups_enabled(&self, enabled: bool) -> AppResult<SystemSettings> {
        let _guard = self.locks.acquire(LockKey::Settings).await;
        let settings = self.settings.set_signups_enabled(enabled, now()).await?;
        info!(enabled, "Signup setting changed");
        Ok(settings)
    }
}
