//! Job trait and single-run execution.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use drivehub_core::error::AppError;

/// A job the scheduler runs on a fixed cron schedule.
#[async_trait]
pub trait PeriodicJob: Send + Sync + std::fmt::Debug {
    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    /// Run the job once and return a summary of what it did.
    async fn run(&self) -> Result<Value, JobExecutionError>;
}

/// Error from a job run
#[derive(Debug, thiserror::Error)]
pub enum JobExecutionError {
    /// Permanent failure, the next run will fail the same way
    #[error("Permanent job failure: {0}")]
    Permanent(String),

    /// Transient failure, the next run may succeed
    #[error("Transient job failure: {0}")]
    Transient(String),
}

impl From<AppError> for JobExecutionError {
    fn from(err: AppError) -> Self {
        if err.kind.is_retryable() {
            Self::Transient(err.to_string())
        } else {
            Self::Permanent(err.to_string())
        }
    }
}

/// Run `job` once, logging its duration and outcome.
pub async fn execute(job: &dyn PeriodicJob) -> Result<Value, JobExecutionError> {
    let started = Instant::now();
    tracing::debug!(job = job.name(), "Job started");

    let result = job.run().await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(summary) => {
            tracing::info!(job = job.name(), elapsed_ms, summary = %summary, "Job completed")
        }
        Err(e @ JobExecutionError::Transient(_)) => {
            tracing::warn!(job = job.name(), elapsed_ms, error = %e, "Job failed, will retry on next tick")
        }
        Err(e) => tracing::error!(job = job.name(), elapsed_ms, error = %e, "Job failed"),
    }
    result
}
