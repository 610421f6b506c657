//! Scheduled background jobs for DriveHub.
//!
//! This crate provides:
//! - A [`PeriodicJob`] trait and a runner that logs each run's outcome
//! - A cron scheduler that fires registered jobs
//! - The built-in jobs: expired-share sweep and trash retention purge

pub mod executor;
pub mod jobs;
pub mod scheduler;

pub use executor::{JobExecutionError, PeriodicJob};
pub use jobs::{ShareSweepJob, TrashPurgeJob};
pub use scheduler::CronScheduler;
