//! # drivehub-entity
//!
//! Row models for DriveHub. Every struct in this crate represents a
//! database table row or a domain value object. All entities derive
//! `Debug`, `Clone`, `Serialize`, `Deserialize`, and database entities
//! additionally derive `sqlx::FromRow`.

pub mod file;
pub mod settings;
pub mod share;
