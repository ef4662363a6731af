//! # Transition Worker
//!
//! Standalone worker process: consumes task descriptors from its
//! subscription queue until SIGINT or SIGTERM, then drains and exits.
//!
//! ## Usage
//!
//! ```bash
//! # Configuration from ./config/transition-worker.yaml
//! transition-worker
//!
//! # Explicit directory, environment and identity
//! transition-worker --config-dir /etc/transition-worker --environment production --worker-id w7
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::info;

use transition_worker::bootstrap::WorkerBootstrap;
use transition_worker::config::loader::{detect_environment, CONFIG_DIR_VAR, ENVIRONMENT_VAR};
use transition_worker::config::ConfigManager;
use transition_worker::logging;

#[derive(Debug, Parser)]
#[command(name = "transition-worker", version, about)]
struct Args {
    /// Directory containing transition-worker.yaml
    #[arg(long, env = CONFIG_DIR_VAR)]
    config_dir: Option<PathBuf>,

    /// Configuration environment section to apply
    #[arg(long, env = ENVIRONMENT_VAR)]
    environment: Option<String>,

    /// Override worker.worker_id
    #[arg(long)]
    worker_id: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logging::init_tracing();

    let environment = args.environment.unwrap_or_else(detect_environment);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %environment,
        "Starting transition worker"
    );

    let manager = ConfigManager::load_from_directory_with_env(args.config_dir, &environment)
        .context("failed to load configuration")?;

    let mut config = manager.config().clone();
    if let Some(worker_id) = args.worker_id {
        config.worker.worker_id = worker_id;
    }
    let config = std::sync::Arc::new(config);
    let grace = config.shutdown_grace();

    let handle = WorkerBootstrap::bootstrap(config)
        .await
        .context("failed to bootstrap worker")?;

    info!(
        queue = %handle.subscription_queue(),
        "Worker running, press Ctrl+C to shut down"
    );

    shutdown_signal().await?;

    info!("Shutdown signal received, draining in-flight attempts");
    let summary = handle.stop(grace).await;
    info!(
        acknowledged = summary.acknowledged,
        rejected = summary.rejected,
        abandoned = summary.abandoned,
        "Transition worker shutdown complete"
    );

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.context("failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<anyhow::Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received Ctrl+C");
        },
        result = terminate => {
            result?;
            info!("Received SIGTERM");
        },
    }
    Ok(())
}
