//! File node entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::kind::NodeKind;

/// A file or folder owned by a single user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FileNode {
    /// Unique node identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// File or folder.
    pub kind: NodeKind,
    /// Content length in bytes. Always `None` for folders.
    pub size: Option<i64>,
    /// MIME type. Files only.
    pub mime_type: Option<String>,
    /// Key of the content in the blob store. Files only.
    pub storage_ref: Option<String>,
    /// The owner. Ownership never changes.
    pub owner_id: Uuid,
    /// Containing folder; `None` means the owner's top level.
    pub parent_id: Option<Uuid>,
    /// Whether the owner starred the node.
    pub starred: bool,
    /// Whether at least one share link covers the node.
    pub shared: bool,
    /// When the node was created.
    pub created_at: DateTime<Utc>,
    /// When the node was last modified.
    pub modified_at: DateTime<Utc>,
    /// When the node was moved to the trash.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl FileNode {
    /// Build a new, untrashed folder.
    pub fn folder(
        name: impl Into<String>,
        parent_id: Option<Uuid>,
        owner_id: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind: NodeKind::Folder,
            size: None,
            mime_type: None,
            storage_ref: None,
            owner_id,
            parent_id,
            starred: false,
            shared: false,
            created_at: now,
            modified_at: now,
            deleted_at: None,
        }
    }

    /// Build a new, untrashed file.
    pub fn file(
        name: impl Into<String>,
        size: i64,
        mime_type: Option<String>,
        storage_ref: impl Into<String>,
        parent_id: Option<Uuid>,
        owner_id: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: NodeKind::File,
            size: Some(size),
            mime_type,
            storage_ref: Some(storage_ref.into()),
            ..Self::folder(name, parent_id, owner_id, now)
        }
    }

    /// Whether this node is a folder.
    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    /// Whether this node is in the trash.
    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }
}
