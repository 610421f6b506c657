//! Redis cache provider.

pub mod operations;

pub use operations::RedisCacheProvider;
