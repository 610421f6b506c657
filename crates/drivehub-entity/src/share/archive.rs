//! Archive entries handed to the ZIP streaming collaborator.

use serde::{Deserialize, Serialize};

/// One file to include in a shared-folder download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Blob store key of the content.
    pub storage_ref: String,
    /// Path inside the archive, relative to the shared root, `/`-separated.
    pub relative_name: String,
}
