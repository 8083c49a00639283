#![forbid(unsafe_code)]

use anyhow::Result;
use scrum_poker::metrics::ServerMetrics;
use scrum_poker::poker::PokerHub;
use scrum_poker::signaling::SignalingServer;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scrum_poker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Scrum poker - Starting server");

    let metrics = ServerMetrics::new();
    let hub = Arc::new(PokerHub::new(metrics.clone()));

    let signaling_server = SignalingServer::new(hub, metrics);
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3001);

    info!("Starting signaling server on port {}", port);

    // Run server with graceful shutdown
    tokio::select! {
        result = signaling_server.serve(port) => {
            if let Err(e) = result {
                tracing::error!("Signaling server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
