//! Core traits defined in `drivehub-core` and implemented by other crates.

pub mod audit;
pub mod cache;
pub mod storage;

pub use audit::AuditSink;
pub use cache::CacheProvider;
pub use storage::BlobStore;
