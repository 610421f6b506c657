//! Share membership rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A row asserting that `file_id` is reachable under share `token`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
pub struct ShareMembership {
    /// The share token.
    pub token: String,
    /// The member node.
    pub file_id: Uuid,
}

/// A membership joined with the owning link's root and expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MembershipRef {
    /// The share token.
    pub token: String,
    /// The member node.
    pub file_id: Uuid,
    /// The link's root node.
    pub root_file_id: Uuid,
    /// The link's expiry.
    pub expires_at: Option<DateTime<Utc>>,
}
