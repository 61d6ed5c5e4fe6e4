//! Configuration file watcher for hot reload.
//!
//! The parent directory is watched rather than the file itself, so editors
//! that save by writing a temp file and renaming it over the original still
//! trigger a reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ProxyConfig;

/// Forwards validated configurations to the reload channel when the file changes.
///
/// Parse and validation failures are logged and the running configuration
/// stays in place. Every valid save is forwarded, even when unchanged: a
/// reload that failed on a missing plugin file must be retryable by saving
/// again once the file is fixed.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ProxyConfig>,
}

impl ConfigWatcher {
    pub fn new(path: &Path, update_tx: mpsc::UnboundedSender<ProxyConfig>) -> Self {
        Self {
            path: path.to_path_buf(),
            update_tx,
        }
    }

    /// Start watching in a background thread.
    ///
    /// The returned watcher must be kept alive for events to keep flowing.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let file = std::fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone());
        let dir = match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let handler_file = file.clone();
        let tx = self.update_tx.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if is_change_to(&event, &handler_file) => {
                    Self::reload(&handler_file, &tx);
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?file, "Config watcher started");
        Ok(watcher)
    }

    fn reload(path: &Path, tx: &mpsc::UnboundedSender<ProxyConfig>) {
        let config = match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(path = ?path, error = %e, "Config file rejected, keeping current configuration");
                return;
            }
        };

        tracing::info!(path = ?path, "Config file changed, reloading");
        if tx.send(config).is_err() {
            tracing::warn!(path = ?path, "Reload channel closed, dropping config");
        }
    }
}

/// True for content-changing events that name `file`.
fn is_change_to(event: &Event, file: &Path) -> bool {
    let relevant = matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Any
    );
    relevant
        && event.paths.iter().any(|p| {
            p == file || std::fs::canonicalize(p).map(|c| c == file).unwrap_or(false)
        })
}
