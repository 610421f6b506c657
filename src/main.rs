//! DriveHub Server
//!
//! Entry point that loads configuration, wires all crates together,
//! starts the scheduled jobs and waits for a shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use drivehub_cache::{CacheLayer, CacheManager};
use drivehub_core::config::AppConfig;
use drivehub_core::config::logging::LoggingConfig;
use drivehub_core::error::AppError;
use drivehub_core::traits::cache::CacheProvider;
use drivehub_database::DatabasePool;
use drivehub_service::TracingAuditSink;
use drivehub_worker::{CronScheduler, ShareSweepJob, TrashPurgeJob};

use drivehub::{Repositories, Services};

/// DriveHub multi-tenant file store
#[derive(Debug, Parser)]
#[command(name = "drivehub-server", version, about)]
struct Cli {
    /// Configuration environment; loads `config/{env}.toml` over the defaults
    #[arg(long, env = "DRIVEHUB_ENV", default_value = "development")]
    env: String,

    /// Apply database migrations and exit
    #[arg(long)]
    migrate_only: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::load(&cli.env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config.logging);

    if let Err(e) = run(config, cli).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig, cli: Cli) -> Result<(), AppError> {
    tracing::info!(env = %cli.env, "Starting DriveHub v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Database connection + migrations ─────────────────
    let db = DatabasePool::connect(&config.database).await?;
    db.health_check().await?;
    drivehub_database::migration::run_migrations(db.pool()).await?;
    if cli.migrate_only {
        tracing::info!("Migrations applied, exiting (--migrate-only)");
        db.close().await;
        return Ok(());
    }

    // ── Step 2: Cache and blob storage ───────────────────────────
    let cache = Arc::new(CacheManager::new(&config.cache).await?);
    match cache.health_check().await {
        Ok(true) => tracing::info!(provider = %config.cache.provider, "Cache reachable"),
        Ok(false) | Err(_) => {
            tracing::warn!(provider = %config.cache.provider, "Cache unreachable, reads fall through to the database")
        }
    }
    let cache = CacheLayer::new(cache, Duration::from_secs(config.cache.default_ttl_seconds));
    let blobs = drivehub_storage::build_blob_store(&config.storage).await?;

    // ── Step 3: Repositories and services ────────────────────────
    let services = Services::new(
        Repositories::postgres(&db, config.database.statement_timeout()),
        blobs,
        cache,
        Arc::new(TracingAuditSink::new()),
        &config.share,
    );
    let settings = services.settings.settings().await?;
    tracing::info!(
        admin_claimed = settings.admin_user_id.is_some(),
        signups_enabled = settings.signups_enabled,
        "System settings loaded"
    );

    // ── Step 4: Scheduled jobs ───────────────────────────────────
    let scheduler = if config.worker.enabled {
        let scheduler = CronScheduler::new().await?;
        scheduler
            .register_default_jobs(
                &config.worker,
                ShareSweepJob::new(Arc::clone(&services.shares)),
                TrashPurgeJob::new(Arc::clone(&services.nodes), config.worker.trash_retention_days),
            )
            .await?;
        scheduler.start().await?;
        Some(scheduler)
    } else {
        tracing::info!("Worker disabled by configuration");
        None
    };

    tracing::info!("DriveHub ready");

    // ── Step 5: Graceful shutdown ────────────────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");

    if let Some(scheduler) = scheduler {
        if let Err(e) = scheduler.shutdown().await {
            tracing::warn!(error = %e, "Scheduler did not shut down cleanly");
        }
    }
    db.close().await;

    tracing::info!("DriveHub shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
