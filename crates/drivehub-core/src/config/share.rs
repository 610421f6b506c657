//! Share link configuration.

use serde::{Deserialize, Serialize};

/// Settings for the share link subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareConfig {
    /// Number of random bytes in a share token (hex-encoded, so the token
    /// is twice as long).
    #[serde(default = "default_token_bytes")]
    pub token_bytes: usize,
    /// TTL in seconds for cached shared-folder listings. Capped per entry
    /// by the link's own expiry.
    #[serde(default = "default_listing_ttl")]
    pub listing_cache_ttl_seconds: u64,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            token_bytes: default_token_bytes(),
            listing_cache_ttl_seconds: default_listing_ttl(),
        }
    }
}

fn default_token_bytes() -> usize {
    24
}

fn default_listing_ttl() -> u64 {
    60
}
