//! # gatelog-server
//!
//! Long-running service for the gatelog RFID gate reader.
//!
//! This binary provides:
//! - A supervised connection to the reader that reconnects forever
//! - Entering/exiting resolution for registered vehicles
//! - REST API for signal quality, connection health and the unknown tag archive
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! GATELOG__READER__HOST=127.0.0.1 cargo run --package gatelog-server
//!
//! # Production
//! GATELOG_CONFIG=/etc/gatelog/config.toml ./gatelog-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;

use anyhow::Context;
use gatelog_core::{Config, EventBus, MemoryStore};
use gatelog_server::api::create_router;
use gatelog_server::logging;
use gatelog_server::state::Services;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = Config::default_path();
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    logging::init(&config.server)?;

    info!(
        config = %config_path.display(),
        reader = %config.reader.address(),
        "Starting gatelog-server"
    );

    let store = MemoryStore::new();
    if let Some(path) = &config.server.vehicles_path {
        store
            .load_vehicles(path)
            .await
            .with_context(|| format!("Failed to load vehicles from {}", path.display()))?;
    }

    let addr: SocketAddr = config
        .server
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind_address))?;

    let bus = EventBus::new(config.server.event_bus_capacity);
    let services = Services::start(config, store, bus);
    let app = create_router(services.state.clone());

    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    services.shutdown();
    info!("gatelog-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
