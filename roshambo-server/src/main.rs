//! Roshambo Server
//!
//! Serves the WebSocket and HTTP endpoints until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use roshambo::{GameServer, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    let config = ServerConfig::from_env().context("invalid configuration")?;
    info!("Roshambo Server v{}", VERSION);
    info!("WebSocket: {}  HTTP: {}", config.ws_bind_addr, config.http_bind_addr);

    let server = Arc::new(GameServer::new(config));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            signal_server.shutdown("Server shutting down").await;
        }
    });

    server.run().await.context("server failed")?;
    info!("Server stopped");
    Ok(())
}
