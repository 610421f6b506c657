//! # drivehub-database
//!
//! PostgreSQL connection management, the repository traits the service
//! layer is written against, and two implementations of them: one backed
//! by PostgreSQL and one held in process memory.

pub mod connection;
pub mod migration;
pub mod repositories;
mod timeout;

pub use connection::DatabasePool;
pub use repositories::{
    MemoryMetadataStore, NodeRepository, PgNodeRepository, PgSettingsRepository,
    PgShareRepository, SettingsRepository, ShareRepository, ShareWrite,
};
