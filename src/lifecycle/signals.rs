//! OS signal handling.
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGTERM/SIGINT trigger graceful shutdown
//! - SIGHUP re-reads the config file and queues it for reload, not shutdown

use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::config::{load_config, ProxyConfig};
use crate::lifecycle::Shutdown;

/// Handle signals until a shutdown signal arrives.
///
/// `config_path` is re-read on SIGHUP; a file that fails to load is logged
/// and nothing is queued.
#[cfg(unix)]
pub async fn handle_signals(
    config_path: Option<PathBuf>,
    update_tx: mpsc::UnboundedSender<ProxyConfig>,
    shutdown: &Shutdown,
) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("SIGINT received");
                break;
            }
            _ = sigterm.recv() => {
                tracing::info!("SIGTERM received");
                break;
            }
            _ = sighup.recv() => {
                let Some(path) = &config_path else {
                    tracing::warn!("SIGHUP received but no config file to reload");
                    continue;
                };
                tracing::info!(path = %path.display(), "SIGHUP received, reloading configuration");
                match load_config(path) {
                    Ok(config) => {
                        let _ = update_tx.send(config);
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to load configuration, keeping current"),
                }
            }
        }
    }

    shutdown.trigger();
    Ok(())
}

#[cfg(not(unix))]
pub async fn handle_signals(
    _config_path: Option<PathBuf>,
    _update_tx: mpsc::UnboundedSender<ProxyConfig>,
    shutdown: &Shutdown,
) -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl+C received");
    shutdown.trigger();
    Ok(())
}
