//! Trash retention purge.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;

use drivehub_service::NodeService;

use crate::executor::{JobExecutionError, PeriodicJob};

/// Permanently deletes trash items older than the retention period.
#[derive(Debug)]
pub struct TrashPurgeJob {
    /// Node service
    nodes: Arc<NodeService>,
    /// Days an item stays in the trash. Zero disables the purge.
    retention_days: u32,
}

impl TrashPurgeJob {
    /// Create a new trash purge job
    pub fn new(nodes: Arc<NodeService>, retention_days: u32) -> Self {
        Self {
            nodes,
            retention_days,
        }
    }
}

#[async_trait]
impl PeriodicJob for TrashPurgeJob {
    fn name(&self) -> &'static str {
        "trash_purge"
    }

    async fn run(&self) -> Result<Value, JobExecutionError> {
        if self.retention_days == 0 {
            return Ok(serde_json::json!({ "task": self.name(), "skipped": true }));
        }

        let cutoff = Utc::now() - Duration::days(i64::from(self.retention_days));
        let purged = self.nodes.purge_trash_older_than(cutoff).await?;
        Ok(serde_json::json!({
            "task": self.name(),
            "cutoff": cutoff,
            "nodes_deleted": purged,
        }))
    }
}
