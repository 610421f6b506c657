//! File and folder entities.

pub mod kind;
pub mod model;

pub use kind::NodeKind;
pub use model::FileNode;
