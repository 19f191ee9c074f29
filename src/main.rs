//! supportlined - anonymous peer-support matchmaking daemon.
//!
//! Pairs listeners with support seekers who share a topic, allocates a
//! private two-person room per match, and relays chat between the two over
//! WebSocket.

mod config;
mod db;
mod directory;
mod error;
mod handlers;
mod http;
mod metrics;
mod network;
mod state;
mod telemetry;

use crate::config::Config;
use crate::db::Database;
use crate::network::Gateway;
use crate::state::Hub;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// How long connections get to run their disconnect cleanup on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = config::validation::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {}", errors.len(), config_path);
    }

    info!(
        server = %config.server.name,
        listen = %config.listen.address,
        tls = config.tls.is_some(),
        "Starting supportlined"
    );

    // Initialize database
    let db = Database::new(config.database_path()).await?;
    let directory = Arc::new(db.directory(config.directory.auto_register));

    let hub = Arc::new(Hub::new(&config, directory));

    // Convention: metrics_port = 0 disables the HTTP side-port (used by tests).
    let metrics_port = config.server.metrics_port.unwrap_or(9090);
    if metrics_port == 0 {
        info!("HTTP side-port disabled");
    } else {
        metrics::init();
        info!("Metrics initialized");

        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            http::run_http_server(metrics_port, hub).await;
        });
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let gateway = Gateway::bind(&config, Arc::clone(&hub), shutdown_tx.clone()).await?;

    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown requested"),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
            let _ = shutdown_tx.send(());
        });
    }

    gateway.run().await?;

    // Give live connections a moment to leave their rooms.
    let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
    while hub.counts().connections > 0 {
        if tokio::time::Instant::now() >= deadline {
            warn!(
                remaining = hub.counts().connections,
                "Shutdown grace period expired"
            );
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    db.close().await;
    info!("Shutdown complete");
    Ok(())
}
