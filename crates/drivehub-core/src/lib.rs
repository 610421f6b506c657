//! # drivehub-core
//!
//! Core crate for DriveHub. Contains the error taxonomy, configuration
//! schemas, shared types (sorting, lock keys), audit events, and the
//! traits implemented by the cache, storage, and service crates.
//!
//! This crate has **no** internal dependencies on other DriveHub crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
