//! Core type definitions used across the DriveHub workspace.

pub mod lock_key;
pub mod sorting;

pub use lock_key::LockKey;
pub use sorting::{SortBy, SortDirection, SortOrder};
