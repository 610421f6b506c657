//! Share token generation.

use rand::RngCore;
use rand::rngs::OsRng;

/// Fewest random bytes a token may carry.
pub const MIN_TOKEN_BYTES: usize = 16;

/// Generates unguessable share tokens from the operating system's CSPRNG.
#[derive(Debug, Clone)]
pub struct TokenGenerator {
    bytes: usize,
}

impl TokenGenerator {
    /// Creates a generator producing tokens of `bytes` random bytes,
    /// raised to [`MIN_TOKEN_BYTES`] if smaller.
    pub fn new(bytes: usize) -> Self {
        Self {
            bytes: bytes.max(MIN_TOKEN_BYTES),
        }
    }

    /// A fresh lowercase hex token.
    pub fn generate(&self) -> String {
        let mut buf = vec![0u8; self.bytes];
        OsRng.fill_bytes(&mut buf);
        hex::encode(&buf)
    }
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new(24)
    }
}

mod hex {
    use std::fmt::Write;

    /// Lowercase hex encoding.
    pub fn encode(bytes: &[u8]) -> String {
        bytes
            .iter()
            .fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
                let _ = write!(out, "{b:02x}");
                out
            })
    }
}
