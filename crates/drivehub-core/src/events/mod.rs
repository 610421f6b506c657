//! Audit events emitted by DriveHub operations.
//!
//! Events are handed to an [`AuditSink`](crate::traits::AuditSink) after the
//! operation they describe has completed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A new share link was created.
    ShareCreated,
    /// An existing share link gained members.
    ShareExtended,
    /// A share link's expiry was changed.
    ShareExpiryUpdated,
    /// A share link was revoked by its owner.
    ShareRevoked,
    /// Expired share links were swept.
    SharesSwept,
    /// Nodes were permanently deleted.
    NodesPurged,
    /// The administrator was claimed.
    AdminClaimed,
}

/// Whether the audited operation succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    /// The operation committed.
    Success,
    /// The operation failed.
    Failure,
}

/// A single audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// The action performed.
    pub action: AuditAction,
    /// Success or failure.
    pub outcome: AuditOutcome,
    /// Identifier of the affected resource (share token, node id).
    pub resource_ref: String,
    /// The user who caused the event (if applicable).
    pub actor_id: Option<Uuid>,
    /// Free-form details.
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    /// Create a successful audit event with empty metadata.
    pub fn success(action: AuditAction, resource_ref: impl Into<String>) -> Self {
        Self {
            action,
            outcome: AuditOutcome::Success,
            resource_ref: resource_ref.into(),
            actor_id: None,
            metadata: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    /// Set the acting user.
    pub fn by(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
