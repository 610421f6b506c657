//! Expired share link sweep.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use drivehub_service::ShareService;

use crate::executor::{JobExecutionError, PeriodicJob};

/// Deletes share links whose expiry has passed.
#[derive(Debug)]
pub struct ShareSweepJob {
    /// Share service
    shares: Arc<ShareService>,
}

impl ShareSweepJob {
    /// Create a new share sweep job
    pub fn new(shares: Arc<ShareService>) -> Self {
        Self { shares }
    }
}

#[async_trait]
impl PeriodicJob for ShareSweepJob {
    fn name(&self) -> &'static str {
        "share_sweep"
    }

    async fn run(&self) -> Result<Value, JobExecutionError> {
        let swept = self.shares.sweep_expired().await?;
        Ok(serde_json::json!({
            "task": self.name(),
            "links_removed": swept,
        }))
    }
}
