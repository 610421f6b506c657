//! Background worker configuration.

use serde::{Deserialize, Serialize};

/// Background job worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the worker is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cron expression for the expired-share sweep.
    #[serde(default = "default_share_sweep_cron")]
    pub share_sweep_cron: String,
    /// Cron expression for the trash retention purge.
    #[serde(default = "default_trash_purge_cron")]
    pub trash_purge_cron: String,
    /// Days a trashed item is kept before it is purged. `0` disables the purge.
    #[serde(default = "default_trash_retention_days")]
    pub trash_retention_days: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            share_sweep_cron: default_share_sweep_cron(),
            trash_purge_cron: default_trash_purge_cron(),
            trash_retention_days: default_trash_retention_days(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_share_sweep_cron() -> String {
    // Every 5 minutes
    "0 */5 * * * *".to_string()
}

fn default_trash_purge_cron() -> String {
    // Daily at 03:30
    "0 30 3 * * *".to_string()
}

fn default_trash_retention_days() -> u32 {
    30
}
