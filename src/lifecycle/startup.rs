//! Startup orchestration.
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal (bad config, plugin rejected)
//! - Subsystems initialize in order: config, logging, metrics, state, listener
//! - Listener binds last (traffic only when ready)

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::watcher::ConfigWatcher;
use crate::config::{load_config, ConfigError, ProxyConfig};
use crate::http::{HttpServer, StateError};
use crate::lifecycle::{signals, Shutdown};
use crate::observability::{logging, metrics};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config watcher failed: {0}")]
    Watch(#[from] notify::Error),
}

/// Command-line overrides applied on top of the config file.
#[derive(Debug, Clone, Default)]
pub struct StartupOptions {
    pub config_path: Option<PathBuf>,
    pub bind_address: Option<String>,
    pub log_level: Option<String>,
    pub watch: bool,
}

/// Start the proxy and run until a shutdown signal.
pub async fn run(options: StartupOptions) -> Result<(), StartupError> {
    let mut config = match &options.config_path {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(addr) = &options.bind_address {
        config.listener.bind_address = addr.clone();
    }
    if let Some(level) = &options.log_level {
        config.observability.log_level = level.clone();
    }

    logging::init_logging(&config.observability.log_level, config.observability.log_format);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "markup-proxy starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let bind_address = config.listener.bind_address.clone();
    let server = HttpServer::new(config)?;

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let (update_tx, update_rx) = mpsc::unbounded_channel();

    // kept alive for the lifetime of the server
    let _watcher = match (&options.config_path, options.watch) {
        (Some(path), true) => Some(ConfigWatcher::new(path, update_tx.clone()).run()?),
        _ => None,
    };

    let server_task = tokio::spawn(server.run(listener, update_rx, shutdown.subscribe()));

    signals::handle_signals(options.config_path.clone(), update_tx, &shutdown).await?;

    match server_task.await {
        Ok(result) => result?,
        Err(e) => tracing::error!(error = %e, "Server task failed"),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
