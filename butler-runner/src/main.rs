//! Butler Runner
//!
//! A worker process that executes queued pipeline and plot runs.
//!
//! The runner claims tasks from the catalog's task queue, sends each command
//! to the compute host, then either catalogues the produced artifacts or
//! stores the captured logs. Any number of runners can share one catalog.

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use butler_engine::config::EngineConfig;
use butler_engine::executor;
use butler_engine::ingest::{FileCommandSniffer, FormatDatabase, Ingestor};
use butler_engine::queue::{SqliteTaskQueue, TaskQueue};
use butler_engine::scheduler::TaskPoller;
use butler_engine::service::CompletionHandler;
use butler_engine::db;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::RunnerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "butler_runner=info,butler_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Butler Runner");

    let config = load_config()?;
    let engine = EngineConfig::from_env().context("Failed to load engine configuration")?;
    engine.validate().context("Invalid engine configuration")?;

    info!(
        "Loaded configuration: runner_id={}, database={}, channel={:?}",
        config.runner_id, engine.database_url, engine.channel
    );

    let sniffer = FileCommandSniffer::new(engine.magic_file.clone());
    let version = sniffer
        .check_available()
        .context("Format detection is unavailable")?;
    info!("Format detection available: {}", version);

    let formats = match &engine.file_formats {
        Some(path) => FormatDatabase::load(path).context("Failed to load file formats")?,
        None => {
            warn!("FILE_FORMATS not set, short formats fall back to file extensions");
            FormatDatabase::default()
        }
    };

    let pool = connect_with_retry(&engine.database_url).await?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let queue: Arc<dyn TaskQueue> = Arc::new(SqliteTaskQueue::new(pool.clone()));
    let channel = executor::from_config(&engine.channel);
    let ingestor = Ingestor::new(Arc::new(sniffer), Arc::new(formats));
    let completion = CompletionHandler::new(pool, engine.layout.clone(), ingestor);

    let poller = TaskPoller::new(config.poller_config(), queue, channel, completion);

    info!("Runner initialized successfully");

    tokio::select! {
        result = poller.run() => {
            if let Err(e) = result {
                error!("Poller error: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested, tasks in flight are abandoned to redelivery");
        }
    }

    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<RunnerConfig> {
    match RunnerConfig::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(e) => {
            info!("{}, using defaults", e);
            let config = RunnerConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Opens the catalog with exponential backoff
///
/// The catalog often lives on a shared mount that may not be ready yet when
/// the runner starts.
async fn connect_with_retry(database_url: &str) -> Result<sqlx::SqlitePool> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match db::create_pool(database_url).await {
            Ok(pool) => {
                if attempt > 1 {
                    info!("Connected to catalog after {} attempt(s)", attempt);
                }
                return Ok(pool);
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    error!("Failed to open catalog after {} attempts", MAX_RETRIES);
                    return Err(anyhow::anyhow!("Failed to open catalog database: {}", e));
                }

                warn!(
                    "Failed to open catalog (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                warn!("Retrying in {} ms...", delay_ms);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                // Exponential backoff with cap
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}
