//! # drivehub-service
//!
//! Business logic for DriveHub. Each service orchestrates the repositories,
//! the cache layer and the blob store to implement one group of use cases:
//! the owner's tree ([`NodeService`]), share links ([`ShareService`]),
//! token-based public reads ([`AccessService`]) and system settings
//! ([`SettingsService`]).
//!
//! Services follow constructor injection. All dependencies are provided
//! at construction time via `Arc` references, and owner-scoped mutations
//! are serialized through a shared [`OperationSerializer`].

pub mod audit;
mod invalidate;
pub mod lock;
pub mod node;
mod retry;
pub mod settings;
pub mod share;
mod time;

#[cfg(test)]
mod testing;

pub use audit::TracingAuditSink;
pub use lock::{LockGuard, OperationSerializer};
pub use node::{NewFile, NodeService, TreeWalker};
pub use settings::SettingsService;
pub use share::{AccessService, ShareService, TokenGenerator};
