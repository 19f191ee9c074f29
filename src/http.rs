//! HTTP side-port: Prometheus metrics, health and matching statistics.
//!
//! Runs on a separate tokio task next to the WebSocket gateway.

use crate::directory::DirectoryStats;
use crate::state::{Hub, HubCounts};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::{Router, routing::get};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

/// Body of `GET /stats`.
#[derive(Debug, Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    directory: DirectoryStats,
    #[serde(flatten)]
    live: HubCounts,
}

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn stats_handler(State(hub): State<Arc<Hub>>) -> Response {
    match hub.directory().stats().await {
        Ok(directory) => Json(StatsResponse {
            directory,
            live: hub.counts(),
        })
        .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read directory stats");
            (StatusCode::SERVICE_UNAVAILABLE, "directory unavailable").into_response()
        }
    }
}

pub fn router(hub: Arc<Hub>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .with_state(hub)
}

/// Run the HTTP side-port.
///
/// Binds to `0.0.0.0:port`. This is a long-running task that should be
/// spawned in the background.
pub async fn run_http_server(port: u16, hub: Arc<Hub>) {
    let app = router(hub);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("HTTP side-port listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind HTTP server on {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("HTTP server error: {}", e);
    }
}
