//! Ecosystem orchestrator service.
//!
//! Registers the configured seed nodes, then drives the orchestrator on a
//! fixed tick until interrupted.

use std::time::Duration;

use anyhow::{Context, Result};
use eco_orchestrator::actors::{OrchestratorActor, Supervisor};
use eco_orchestrator::config::Config;
use eco_orchestrator::worker::CycleWorker;
use eco_orchestrator::Orchestrator;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        strategy = %config.orchestrator.default_strategy,
        tick_interval_ms = config.tick_interval.as_millis() as u64,
        seed_nodes = config.seed_nodes.len(),
        "Starting ecosystem orchestrator"
    );

    let mut supervisor = Supervisor::new();
    let handle = OrchestratorActor::new(Orchestrator::new(config.orchestrator.clone()))
        .spawn(&mut supervisor, config.mailbox_size);

    for seed in &config.seed_nodes {
        let added = handle
            .add_node(
                seed.node_id.clone(),
                seed.node_type.clone(),
                seed.capabilities.iter(),
                seed.max_tasks,
            )
            .await
            .context("registering seed node")?;
        if !added {
            warn!(node_id = %seed.node_id, "Duplicate seed node ignored");
        }
    }

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = CycleWorker::new(handle.clone(), config.tick_interval);
    let worker_handle = tokio::spawn(async move {
        worker.run(shutdown_rx).await;
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = worker_handle => {
            if let Err(e) = result {
                error!(error = %e, "Cycle worker panicked");
            } else {
                warn!("Cycle worker exited");
            }
        }
    }

    let _ = shutdown_tx.send(true);

    match handle.status().await {
        Ok(status) => match serde_json::to_string(&status) {
            Ok(json) => info!(status = %json, "Final orchestrator status"),
            Err(e) => warn!(error = %e, "Failed to encode final status"),
        },
        Err(e) => warn!(error = %e, "Orchestrator unavailable at shutdown"),
    }

    let _ = handle.shutdown().await;
    supervisor.stop_all(Duration::from_secs(2)).await;

    info!("Orchestrator shutdown complete");
    Ok(())
}
