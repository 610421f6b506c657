//! Built-in periodic jobs.

pub mod share_sweep;
pub mod trash_purge;

pub use share_sweep::ShareSweepJob;
pub use trash_purge::TrashPurgeJob;
