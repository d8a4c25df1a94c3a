//! Questlog compactor entry point.

use std::process::ExitCode;
use std::sync::Arc;

use questlog_compactor::config::CompactorConfig;
use questlog_compactor::error::AppError;
use questlog_compactor::job;
use questlog_core::clock::SystemClock;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "compactor run failed");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run() -> Result<(), AppError> {
    let config = CompactorConfig::from_env()?;
    tracing::info!(
        retention_days = config.archival.retention.num_days(),
        rollup_types = ?config.archival.rollup_event_types,
        purge_originals = config.archival.purge_originals,
        "Starting Questlog compactor"
    );

    // Create database connection pool.
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;

    let compactor = job::pg_compactor(&pool, config.archival.clone(), Arc::new(SystemClock));
    let summary = job::run(&compactor, config.snapshot_keep_count).await?;
    tracing::info!(
        compressed = summary.report.compressed,
        rollups = summary.report.rollups_created,
        purged = summary.report.purged,
        snapshots_pruned = summary.snapshots_pruned,
        "compactor run complete"
    );

    pool.close().await;
    Ok(())
}
