//! fleetdeck daemon
//!
//! Serves the fleet's container state, control operations and live feeds
//! over HTTP, server-sent events and WebSocket.

use std::sync::Arc;

use color_eyre::Result;
use fleetdeck_core::Fleet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod factory;
mod router;
mod state;

use crate::config::{Config, DaemonConfig};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let (config, config_path) = Config::load_default()?;
    init_tracing(&config.daemon);
    match &config_path {
        Some(path) => info!(path = %path.display(), "configuration loaded"),
        None => warn!("no config file found, using defaults"),
    }

    let fleet = Fleet::new(
        config.hosts(),
        factory::build_deps(&config),
        config.fleet.clone(),
    );
    fleet.connect_all();
    let tasks = fleet.spawn_background();

    let bind = config.daemon.bind.clone();
    let app = router::create_router(Arc::new(AppState::new(fleet.clone(), config)));
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(bind = %bind, "fleetdeck daemon listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    tasks.abort();
    fleet.shutdown().await;
    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(daemon: &DaemonConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&daemon.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if daemon.log_format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
