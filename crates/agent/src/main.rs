//! Cluster Monitor - polling monitor for graph database clusters
//!
//! Runs the catalog queries against every cluster member and exposes the
//! results, health and metrics over HTTP.

use anyhow::Result;
use clap::Parser;
use cluster_monitor::{
    api,
    config::{MonitorConfig, DEFAULT_CONFIG_FILE},
    monitor::{self, Monitor},
};
use monitor_lib::{
    health::{components, HealthRegistry},
    observability::StructuredLogger,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// How often the feed health component is recomputed
const HEALTH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "cluster-monitor", version, about)]
struct Args {
    /// Config file (TOML); defaults to monitor.toml if present
    #[arg(short, long, env = "MONITOR_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => MonitorConfig::load_from(Some(path.as_path()), true)?,
        None => MonitorConfig::load_from(Some(Path::new(DEFAULT_CONFIG_FILE)), false)?,
    };
    info!(
        instance = %config.instance,
        members = config.members.len(),
        "Monitor configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::FEEDS).await;
    health_registry.register(components::REGISTRY).await;
    health_registry.register(components::API).await;

    let logger = StructuredLogger::new(&config.instance);
    let monitor = Monitor::start(&config, logger.clone())?;
    logger.log_startup(MONITOR_VERSION, config.members.len(), monitor.feeds.len());
    if config.members.is_empty() {
        warn!("No cluster members configured, no feeds will run");
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let sweeper = monitor.context.registry.spawn_sweeper(
        config.sweep_interval(),
        config.idle_grace(),
        shutdown_tx.subscribe(),
    );
    let health_updates = monitor::spawn_health_updates(
        health_registry.clone(),
        monitor.context.registry.clone(),
        HEALTH_INTERVAL,
        shutdown_tx.subscribe(),
    );

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        monitor.context.clone(),
    ));
    let mut api_shutdown = shutdown_tx.subscribe();
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, async move {
        let _ = api_shutdown.recv().await;
    }));

    health_registry.set_ready(true).await;

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    let _ = shutdown_tx.send(());
    monitor.shutdown();
    let _ = tokio::join!(sweeper, health_updates);
    api_handle.await??;

    info!("Shutdown complete");
    Ok(())
}
