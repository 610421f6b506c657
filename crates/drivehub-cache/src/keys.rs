//! Cache key builders for all DriveHub cache entries.
//!
//! Centralising key construction prevents typos and makes it easy
//! to find every key the application uses. Every key that a writer may
//! need to drop in bulk has a matching `*_prefix` builder.

use uuid::Uuid;

use drivehub_core::types::SortOrder;

/// Prefix applied to all DriveHub cache keys.
const PREFIX: &str = "drivehub";

// ── Share keys ─────────────────────────────────────────────

/// Cache key for a share link by token.
pub fn share_by_token(token: &str) -> String {
    format!("{PREFIX}:share:token:{token}")
}

/// Cache key for "the link rooted at this node", negative results included.
pub fn share_for_root(owner_id: Uuid, file_id: Uuid) -> String {
    format!("{PREFIX}:share:root:{owner_id}:{file_id}")
}

/// Cache key for the public listing of a folder under a share.
pub fn shared_listing(owner_id: Uuid, token: &str, folder_id: Uuid) -> String {
    format!("{PREFIX}:share:listing:{owner_id}:{token}:{folder_id}")
}

/// Prefix of every shared listing of an owner, across all their links.
pub fn shared_listing_prefix(owner_id: Uuid) -> String {
    format!("{PREFIX}:share:listing:{owner_id}:")
}

// ── Tree keys ──────────────────────────────────────────────

/// Cache key for an owner's folder listing in a given order.
pub fn children(owner_id: Uuid, parent_id: Option<Uuid>, order: SortOrder) -> String {
    let parent = parent_id.map_or_else(|| "root".to_string(), |id| id.to_string());
    format!(
        "{PREFIX}:children:{owner_id}:{parent}:{:?}:{}",
        order.by,
        order.direction.as_sql()
    )
}

/// Prefix of every folder listing of an owner.
pub fn children_prefix(owner_id: Uuid) -> String {
    format!("{PREFIX}:children:{owner_id}:")
}
