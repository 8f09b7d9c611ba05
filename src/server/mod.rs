//! Server module for Cadence
//!
//! # Module Structure
//!
//! - `config`: Configuration structures
//! - `loader`: Configuration loading from files and environment
//! - `task_handler`: Shell execution callback handed to the engine

pub mod config;
mod loader;
mod task_handler;

use anyhow::{Context, Result};
use cadence_core::{SchedulerEngine, SchedulerStore};
use std::sync::Arc;
use tracing::info;

pub use config::AppConfig;
pub use loader::load_config;
pub use task_handler::shell_executor;

/// Open the engine over the configured task directory
pub fn open_engine(config: &AppConfig) -> Result<SchedulerEngine> {
    let dir = config.scheduler.resolve_tasks_dir()?;
    let store = SchedulerStore::from_path(&dir)
        .with_context(|| format!("Failed to open task directory {}", dir.display()))?;

    SchedulerEngine::builder()
        .store(store)
        .config(config.scheduler.engine_config())
        .executor(shell_executor(&config.executor))
        .build()
        .context("Failed to load scheduled tasks")
}

/// Run the dispatcher until Ctrl-C
pub async fn run(config: AppConfig) -> Result<()> {
    info!("Starting Cadence v{}", env!("CARGO_PKG_VERSION"));

    let engine = Arc::new(open_engine(&config)?);
    let status = engine.status(0).await;
    info!(
        "Scheduler ready: {} tasks, {} pending",
        status.total,
        status
            .by_status
            .get(&cadence_core::TaskStatus::Pending)
            .copied()
            .unwrap_or(0)
    );

    engine.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received, waiting for the running task");

    engine.stop().await;
    info!("Cadence shutdown complete");
    Ok(())
}
