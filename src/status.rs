//! Read-only operator status endpoint.
//!
//! Exposes the phase registry over HTTP for external observability. This
//! surface never mutates relay state.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::registry::{Phase, PhaseRegistry};

#[derive(Debug, Serialize)]
struct StatusResponse {
    /// Current phase per connected client, keyed by client id.
    clients: BTreeMap<String, Phase>,
    /// Whole-system readiness (non-empty and every client at ready).
    all_ready: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn get_status(State(registry): State<PhaseRegistry>) -> Json<StatusResponse> {
    let clients = registry
        .snapshot()
        .into_iter()
        .map(|(id, phase)| (id.to_string(), phase))
        .collect();
    Json(StatusResponse {
        clients,
        all_ready: registry.all_ready(),
    })
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub fn build_router(registry: PhaseRegistry) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

/// Serve the status endpoint on `bind_addr`.
pub async fn serve(registry: PhaseRegistry, bind_addr: &str) -> Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind status listener on {}", bind_addr))?;
    info!(addr = %bind_addr, "status endpoint listening");
    axum::serve(listener, build_router(registry))
        .await
        .context("status server failed")
}
