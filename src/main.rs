//! hop-proxy
//!
//! Forwards each inbound HTTP request to the backend named by its Host
//! header and streams the response back.
//!
//! ```text
//!   client ──▶ listener ──▶ compression gate ──▶ handler ──▶ forwarding engine ──▶ backend
//!   client ◀── (gzip?) sink ◀────────────────────────────── response stream ◀──────┘
//! ```

use std::net::SocketAddr;

use clap::Parser;

use hop_proxy::cli::Cli;
use hop_proxy::lifecycle::{signals, Shutdown};
use hop_proxy::net::Listener;
use hop_proxy::observability::{logging, metrics};
use hop_proxy::HttpServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load()?;

    logging::init(&config.observability);

    tracing::info!("hop-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address(),
        max_connections = config.listener.max_connections,
        compression = config.features.compression,
        keepalive = config.features.keepalive,
        local_caching = config.features.local_caching,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        shutdown.trigger();
    });

    let server = HttpServer::new(config);
    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
