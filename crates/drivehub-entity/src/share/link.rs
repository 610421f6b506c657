//! Share link entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A token granting unauthenticated read access to a subtree.
///
/// At most one link exists per `(root_file_id, owner_id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ShareLink {
    /// Public, unguessable identifier. Doubles as the primary key.
    pub token: String,
    /// The node the link was created for.
    pub root_file_id: Uuid,
    /// Owner of the root node.
    pub owner_id: Uuid,
    /// When the link stops being valid. `None` means never.
    pub expires_at: Option<DateTime<Utc>>,
    /// When the link was created.
    pub created_at: DateTime<Utc>,
}

impl ShareLink {
    /// Whether the link is expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Whether the link is expired right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}
