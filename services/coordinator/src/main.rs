//! AOF rewrite coordinator binary.
//!
//! Connects to every configured store instance, then serializes their AOF
//! rewrites until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use aofc_coordinator::{Config, FleetScheduler, RedisInstance, StoreInstance};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How long the scheduler gets to notice shutdown before we stop waiting.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to configured level)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting AOF rewrite coordinator");
    info!(
        hosts = ?config.hosts,
        mode = ?config.mode,
        db = config.db,
        poll_interval_ms = config.poll_interval_ms,
        growth_threshold_percent = config.growth_threshold_percent,
        "Configuration loaded"
    );

    // Every instance must answer before we start coordinating
    let options = config.client_options();
    let mut instances: Vec<Arc<dyn StoreInstance>> = Vec::with_capacity(config.hosts.len());
    for host in &config.hosts {
        info!(host = %host, "Connecting to store instance");
        let instance = RedisInstance::connect(host.clone(), options.clone())
            .await
            .with_context(|| format!("Failed to connect to {host}"))?;
        instances.push(Arc::new(instance));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = FleetScheduler::new(instances, config.gate_policy());
    let mut scheduler_handle = tokio::spawn(async move {
        scheduler.run(shutdown_rx).await;
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = &mut scheduler_handle => {
            if let Err(e) = result {
                error!(error = %e, "Scheduler task panicked");
            }
            return Ok(());
        }
    }

    // Signal shutdown to the scheduler and any open gate
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(SHUTDOWN_GRACE, scheduler_handle).await {
        Ok(Ok(())) => info!("Coordinator shutdown complete"),
        Ok(Err(e)) => error!(error = %e, "Scheduler task panicked"),
        Err(_) => warn!("Scheduler did not stop within grace period"),
    }

    Ok(())
}
