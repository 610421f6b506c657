//! System settings aggregate.

pub mod model;

pub use model::SystemSettings;
