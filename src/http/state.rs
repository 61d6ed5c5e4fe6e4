//! Shared proxy state and configuration reload.
//!
//! # Design Decisions
//! - Request handlers load an immutable [`ProxySnapshot`] once and use it for
//!   the whole request; a reload never changes state under a running request
//! - Reload is single-writer (async mutex) and builds the next snapshot
//!   completely before one atomic swap
//! - Any reload error leaves the current snapshot in place

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::Uri;
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

use crate::cache::{build_store, CacheEngine, CacheError};
use crate::config::validation::validate_config;
use crate::config::{ConfigError, ProxyConfig};
use crate::observability::metrics;
use crate::plugins::{PluginError, PluginLoader, PluginManager, PluginRegistry};

/// Failures building or replacing the proxy state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("plugin load failed: {0}")]
    Plugins(#[from] PluginError),

    #[error("cache setup failed: {0}")]
    Cache(#[from] CacheError),

    #[error("invalid backend target '{url}': {reason}")]
    Target { url: String, reason: String },

    #[error("plugin load task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Where requests are forwarded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    authority: Authority,
    base_path: String,
}

impl BackendTarget {
    pub fn parse(backend_url: &str) -> Result<Self, StateError> {
        let invalid = |reason: String| StateError::Target {
            url: backend_url.to_string(),
            reason,
        };

        let url = Url::parse(backend_url).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() != "http" {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        let host = url.host_str().ok_or_else(|| invalid("missing host".to_string()))?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let authority = Authority::try_from(authority.as_str()).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            authority,
            base_path: url.path().trim_end_matches('/').to_string(),
        })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Absolute backend URI for an inbound path and query.
    pub fn uri_for(&self, path_and_query: Option<&PathAndQuery>) -> Result<Uri, axum::http::Error> {
        let pq = path_and_query.map(PathAndQuery::as_str).unwrap_or("/");
        Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(self.authority.clone())
            .path_and_query(format!("{}{}", self.base_path, pq))
            .build()
    }
}

/// Everything a request needs, swapped as one unit on reload.
pub struct ProxySnapshot {
    pub config: Arc<ProxyConfig>,
    pub backend: BackendTarget,
    pub cache: Arc<CacheEngine>,
    pub plugins: Arc<PluginRegistry>,
}

/// Live proxy state.
pub struct ProxyState {
    inner: ArcSwap<ProxySnapshot>,
    plugin_manager: Arc<PluginManager>,
    reload_lock: Mutex<()>,
}

impl ProxyState {
    /// Build the initial state. Loads plugins synchronously.
    pub fn new(config: ProxyConfig, loader: Arc<dyn PluginLoader>) -> Result<Self, StateError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let backend = BackendTarget::parse(&config.backend_url)?;
        let store = build_store(&config.cache, connect_timeout(&config))?;
        let plugin_manager = Arc::new(PluginManager::new(loader));
        let plugins = plugin_manager.load_all(&config)?;
        let cache = Arc::new(CacheEngine::new(store, &config));

        tracing::info!(
            backend = %config.backend_url,
            rules = config.mime_types.len(),
            plugins = plugins.len(),
            "Proxy state initialized"
        );

        Ok(Self {
            inner: ArcSwap::from_pointee(ProxySnapshot {
                config: Arc::new(config),
                backend,
                cache,
                plugins,
            }),
            plugin_manager,
            reload_lock: Mutex::new(()),
        })
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<ProxySnapshot> {
        self.inner.load_full()
    }

    /// Replace the running configuration, all or nothing.
    pub async fn reload(&self, config: ProxyConfig) -> Result<(), StateError> {
        let _guard = self.reload_lock.lock().await;

        let result = self.build_next(config).await;
        match &result {
            Ok(()) => {
                metrics::record_config_reload("success");
                tracing::info!("Configuration reloaded");
            }
            Err(e) => {
                metrics::record_config_reload("failure");
                tracing::error!(error = %e, "Configuration reload rejected, keeping current configuration");
            }
        }
        result
    }

    async fn build_next(&self, config: ProxyConfig) -> Result<(), StateError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let current = self.snapshot();

        let backend = BackendTarget::parse(&config.backend_url)?;

        let store = if current.config.cache.connection_changed(&config.cache) {
            tracing::info!("Cache connection settings changed, creating new store");
            build_store(&config.cache, connect_timeout(&config))?
        } else {
            current.cache.store().clone()
        };

        let config = Arc::new(config);
        let manager = self.plugin_manager.clone();
        let plugin_config = config.clone();
        let plugins = tokio::task::spawn_blocking(move || manager.load_all(&plugin_config)).await??;

        let cache = Arc::new(CacheEngine::new(store, &config));
        self.inner.store(Arc::new(ProxySnapshot {
            config,
            backend,
            cache,
            plugins,
        }));
        Ok(())
    }
}

fn connect_timeout(config: &ProxyConfig) -> Duration {
    Duration::from_secs(config.timeouts.connect_secs.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheBackendKind, MimeTypeConfig, PluginRef, PluginsConfig};
    use crate::plugin::{Capabilities, Plugin};
    use crate::plugins::InProcessLoader;

    #[test]
    fn test_backend_target() {
        let target = BackendTarget::parse("http://backend:8081").unwrap();
        assert_eq!(target.authority().as_str(), "backend:8081");
        let pq = PathAndQuery::from_static("/a?b=1");
        assert_eq!(target.uri_for(Some(&pq)).unwrap().to_string(), "http://backend:8081/a?b=1");

        assert!(BackendTarget::parse("https://backend").is_err());
        assert!(BackendTarget::parse("not a url").is_err());
    }

    fn memory_config(backend: &str) -> ProxyConfig {
        let mut config = ProxyConfig {
            backend_url: backend.into(),
            ..Default::default()
        };
        config.cache.backend = CacheBackendKind::Memory;
        config
    }

    #[tokio::test]
    async fn test_reload_swaps_backend_and_keeps_store() {
        let state = ProxyState::new(memory_config("http://127.0.0.1:1"), Arc::new(InProcessLoader::new())).unwrap();
        let before = state.snapshot();

        let mut next = memory_config("http://127.0.0.1:2");
        next.cache.fallback_ttl_secs = 5;
        state.reload(next).await.unwrap();

        let after = state.snapshot();
        assert_eq!(after.backend.authority().as_str(), "127.0.0.1:2");
        assert_eq!(after.cache.fallback_ttl(), Duration::from_secs(5));
        assert!(Arc::ptr_eq(before.cache.store(), after.cache.store()));
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_snapshot() {
        struct Xml;
        impl Plugin for Xml {
            fn capabilities(&self) -> Capabilities {
                Capabilities::ELEMENT
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let plugin_path = dir.path().join("xml.so");
        std::fs::write(&plugin_path, b"stub").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&plugin_path, std::fs::Permissions::from_mode(0o644)).unwrap();
        }

        let loader = Arc::new(InProcessLoader::new());
        loader.register("XmlPlugin", || Arc::new(Xml) as Arc<dyn Plugin>);

        let state = ProxyState::new(memory_config("http://127.0.0.1:1"), loader).unwrap();

        let mut bad = memory_config("http://127.0.0.1:2");
        bad.plugins = PluginsConfig {
            allowed_dirs: vec![dir.path().to_path_buf()],
        };
        bad.mime_types.push(MimeTypeConfig {
            mime_type: "text/html".into(),
            plugins: vec![PluginRef {
                path: plugin_path.to_string_lossy().into_owned(),
                name: "XmlPlugin".into(),
            }],
        });

        let err = state.reload(bad).await.unwrap_err();
        assert!(matches!(err, StateError::Plugins(ref e) if e.is_interface()));
        assert_eq!(state.snapshot().backend.authority().as_str(), "127.0.0.1:1");
        assert!(state.snapshot().config.mime_types.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let state = ProxyState::new(memory_config("http://127.0.0.1:1"), Arc::new(InProcessLoader::new())).unwrap();
        let err = state.reload(memory_config("")).await.unwrap_err();
        assert!(matches!(err, StateError::Config(_)));
    }
}
