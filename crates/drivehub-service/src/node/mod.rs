//! Owner-facing tree operations.

pub mod name;
pub mod service;
pub mod tree;

pub use service::{NewFile, NodeService};
pub use tree::{Closure, MAX_TREE_DEPTH, TreeWalker};
