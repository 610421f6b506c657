//! Cron scheduler for the periodic jobs.

use std::sync::Arc;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};

use drivehub_core::config::worker::WorkerConfig;
use drivehub_core::error::AppError;

use crate::executor::{self, PeriodicJob};
use crate::jobs::{ShareSweepJob, TrashPurgeJob};

/// Cron-based scheduler for periodic background jobs
#[derive(Clone)]
pub struct CronScheduler {
    /// The underlying job scheduler
    scheduler: JobScheduler,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler").finish()
    }
}

impl CronScheduler {
    /// Create a new cron scheduler
    pub async fn new() -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {e}")))?;

        Ok(Self { scheduler })
    }

    /// Register the share sweep and trash purge on their configured
    /// schedules
    pub async fn register_default_jobs(
        &self,
        config: &WorkerConfig,
        share_sweep: ShareSweepJob,
        trash_purge: TrashPurgeJob,
    ) -> Result<(), AppError> {
        self.register(&config.share_sweep_cron, Arc::new(share_sweep))
            .await?;
        self.register(&config.trash_purge_cron, Arc::new(trash_purge))
            .await?;

        tracing::info!("All scheduled jobs registered");
        Ok(())
    }

    /// Run `job` whenever `cron` fires
    pub async fn register(&self, cron: &str, job: Arc<dyn PeriodicJob>) -> Result<(), AppError> {
        let name = job.name();
        let scheduled = CronJob::new_async(cron, move |_uuid, _lock| {
            let job = Arc::clone(&job);
            Box::pin(async move {
                // Outcome is logged by the executor; the next tick retries.
                let _ = executor::execute(job.as_ref()).await;
            })
        })
        .map_err(|e| AppError::configuration(format!("Invalid schedule '{cron}' for {name}: {e}")))?;

        self.scheduler
            .add(scheduled)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add {name} schedule: {e}")))?;

        tracing::info!(job = name, cron, "Registered scheduled job");
        Ok(())
    }

    /// Start the scheduler
    pub async fn start(&self) -> Result<(), AppError> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {e}")))?;

        tracing::info!("Cron scheduler started");
        Ok(())
    }

    /// Shutdown the scheduler
    pub async fn shutdown(&self) -> Result<(), AppError> {
        let mut scheduler = self.scheduler.clone();
        scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {e}")))?;

        tracing::info!("Cron scheduler shut down");
        Ok(())
    }
}
