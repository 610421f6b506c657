//! System settings entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The single-row system settings aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SystemSettings {
    /// Always `1`.
    pub id: i16,
    /// The administrator, once claimed.
    pub admin_user_id: Option<Uuid>,
    /// Whether new users may sign up.
    pub signups_enabled: bool,
    /// When the row last changed.
    pub updated_at: DateTime<Utc>,
}

impl SystemSettings {
    /// The settings before anyone has claimed the administrator role.
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            id: 1,
            admin_user_id: None,
            signups_enabled: true,
            updated_at: now,
        }
    }
}
