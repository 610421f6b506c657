//! # drivehub-cache
//!
//! Cache provider implementations for DriveHub. Supports two modes:
//!
//! - **memory**: In-process cache using [moka](https://crates.io/crates/moka)
//! - **redis**: Redis-backed cache using the [redis](https://crates.io/crates/redis) crate
//!
//! The provider is selected at runtime based on configuration. Services do
//! not talk to the provider directly; they go through [`CacheLayer`], which
//! bounds TTLs by real-world expiry and logs (rather than propagates) cache
//! failures.

pub mod keys;
pub mod layer;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use layer::{CacheLayer, FillTicket, bounded_ttl};
pub use provider::CacheManager;
