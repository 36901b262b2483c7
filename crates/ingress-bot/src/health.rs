//! Health check HTTP server for Kubernetes probes.
//!
//! Provides `/healthz` (liveness) and `/readyz` (readiness) endpoints.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Shared state for health check endpoints.
#[derive(Debug, Default)]
pub struct HealthState {
    /// Whether a reconciliation pass has completed successfully.
    reconciled: AtomicBool,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful reconciliation pass.
    pub fn mark_reconciled(&self) {
        if !self.reconciled.swap(true, Ordering::SeqCst) {
            info!("Health check: first reconciliation pass complete");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.reconciled.load(Ordering::SeqCst)
    }
}

/// Run the health check HTTP server.
///
/// Runs until the server encounters a fatal error. Binds all interfaces since
/// the kubelet probes the pod IP.
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> std::io::Result<()> {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = port, "Health check server listening");

    axum::serve(listener, app).await
}

/// Liveness probe endpoint.
async fn healthz() -> StatusCode {
    debug!("Liveness probe: OK");
    StatusCode::OK
}

/// Readiness probe endpoint.
///
/// Returns 503 until the first reconciliation pass has succeeded.
async fn readyz(State(state): State<Arc<HealthState>>) -> StatusCode {
    if state.is_ready() {
        debug!("Readiness probe: OK");
        StatusCode::OK
    } else {
        debug!("Readiness probe: NOT READY (no successful pass yet)");
        StatusCode::SERVICE_UNAVAILABLE
    }
}
