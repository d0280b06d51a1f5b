//! inventory-sync - A multi-region cloud inventory sync engine
//!
//! Runs the refresh scheduler against the configured targets until
//! interrupted.

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use inventory_sync::config::Config;
use inventory_sync::otel::{init_tracing, OtelProvider, SyncMetrics};
use inventory_sync::provider::{HttpInventoryProvider, RegionCatalog, ResourceProvider};
use inventory_sync::store::{InventoryStore, SqliteStore};
use inventory_sync::sync::{RefreshScheduler, SyncOrchestrator};

/// inventory-sync - A multi-region cloud inventory sync engine
#[derive(Parser, Debug)]
#[command(name = "inventory-sync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "INVENTORY_SYNC_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let otel_provider = OtelProvider::new(&config.otel)?;
    init_tracing(&otel_provider, &config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting inventory-sync"
    );

    let store: Arc<dyn InventoryStore> = Arc::new(SqliteStore::new(&config.database.path).await?);
    info!(path = %config.database.path, "Database initialized");

    let provider: Arc<dyn ResourceProvider> = Arc::new(HttpInventoryProvider::new(&config.provider)?);
    info!(endpoint = %config.provider.endpoint, "Inventory provider initialized");

    let discovery_account = config
        .scheduler
        .targets
        .first()
        .map(|t| t.account_id.as_str())
        .filter(|_| config.regions.discover);
    let catalog = match discovery_account {
        Some(account_id) => {
            RegionCatalog::discover(provider.as_ref(), account_id, &config.regions).await
        }
        None => RegionCatalog::from_config(&config.regions),
    };
    info!(regions = ?catalog.regions(), "Region catalog ready");

    let metrics = SyncMetrics::new(&otel_provider.meter());
    let orchestrator = Arc::new(
        SyncOrchestrator::from_config(&config, provider, store, catalog).with_metrics(metrics),
    );

    if config.scheduler.targets.is_empty() {
        info!("No refresh targets configured; waiting for shutdown");
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scheduler = RefreshScheduler::new(config.scheduler.clone(), orchestrator, shutdown_rx);
    let scheduler_handle = tokio::spawn(scheduler.run());

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    if let Err(e) = scheduler_handle.await {
        error!(error = %e, "Refresh scheduler task failed");
    }

    if let Err(e) = otel_provider.shutdown() {
        error!(error = %e, "Failed to shutdown OpenTelemetry");
    }

    info!("inventory-sync shutdown complete");
    Ok(())
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Tracing is not initialized yet
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}

/// Resolve when Ctrl+C or SIGTERM is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
