//! Repository traits and their implementations.
//!
//! The service layer only sees the traits. Every method that writes more
//! than one row is a single unit: one transaction in PostgreSQL, one
//! write-locked critical section in memory.

pub mod memory;
pub mod node;
pub mod settings;
pub mod share;

pub use memory::MemoryMetadataStore;
pub use node::{NodeRepository, PgNodeRepository};
pub use settings::{PgSettingsRepository, SettingsRepository};
pub use share::{PgShareRepository, ShareRepository, ShareWrite};
