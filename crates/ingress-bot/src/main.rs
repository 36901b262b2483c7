use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::select;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use ingress_bot::cluster::connect;
use ingress_bot::health::{run_health_server, HealthState};
use ingress_bot::{BotConfig, KubeStore, Reconciler};

#[tokio::main]
async fn main() -> Result<()> {
    let config = BotConfig::from_env().context("Failed to load configuration")?;

    // RUST_LOG overrides LOG_LEVEL when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_directive()));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false),
        )
        .with(filter)
        .init();

    info!(
        interval_secs = config.check_interval.as_secs(),
        dry_run = config.dry_run,
        selector = %config.ingress.ownership.selector(),
        "ingress-bot starting"
    );

    let client = connect(config.kubeconfig_path.as_deref())
        .await
        .context("Failed to create Kubernetes client")?;

    info!("Connected to Kubernetes cluster");

    let health = Arc::new(HealthState::new());
    if config.health_port != 0 {
        let state = health.clone();
        let port = config.health_port;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(state, port).await {
                error!(error = %e, "Health check server failed");
            }
        });
    }

    let reconciler = Reconciler::new(KubeStore::new(client), &config).with_health(health);

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    select! {
        result = reconciler.run() => {
            // A failed pass exits non-zero so the pod restarts
            result.context("Reconciliation failed")?;
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
    }

    info!("Shutdown complete");
    Ok(())
}
