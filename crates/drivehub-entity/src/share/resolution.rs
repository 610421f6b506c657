//! Outcome of resolving a share token.

use serde::{Deserialize, Serialize};

use crate::file::FileNode;

use super::link::ShareLink;

/// Result of looking up a share by its token.
///
/// An unknown token is not represented here; it surfaces as a `NotFound`
/// error instead so callers can tell "gone" from "never existed".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ShareResolution {
    /// The link is live and its root node is available.
    Active {
        /// The link.
        link: ShareLink,
        /// The shared root node.
        node: FileNode,
    },
    /// The link exists but is past its expiry. Content must not be served.
    Expired {
        /// The token that was resolved.
        token: String,
    },
}

impl ShareResolution {
    /// Whether the link is expired.
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired { .. })
    }
}
