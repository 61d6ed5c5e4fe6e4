//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! request (method, path, query, headers)
//!     → CacheEngine::key (consults the per-path vary index)
//!     → CacheEngine::get → Some(entry) → replay as HIT
//!                        → None       → forward, process, then
//!     → CacheEngine::is_cacheable
//!     → CacheEngine::set (vary index + entry, TTL from policy)
//! ```
//!
//! # Design Decisions
//! - Reads never fail a request: any store or decode error is a miss
//! - Writes are best-effort and only logged
//! - The store is a trait object so Redis and the in-process map are interchangeable
//! - Expiry is enforced both by the store TTL and on read

pub mod entry;
pub mod key;
pub mod policy;
pub mod redis;
pub mod store;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, Method, StatusCode};
use thiserror::Error;

use crate::config::{CacheBackendKind, CacheConfig, ProxyConfig};
use crate::observability::metrics;

pub use entry::CacheEntry;
pub use policy::{CacheControl, Vary};
pub use self::redis::RedisStore;
pub use store::{CacheStore, MemoryStore};

/// Cache store failures. Never surfaced to clients.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connection failed: {0}")]
    Connection(String),

    #[error("cache command failed: {0}")]
    Command(#[from] ::redis::RedisError),

    #[error("cache entry could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Create the store selected by `config`.
///
/// Redis stores connect lazily, so this only fails on unusable parameters.
pub fn build_store(config: &CacheConfig, connect_timeout: Duration) -> Result<Arc<dyn CacheStore>, CacheError> {
    let store: Arc<dyn CacheStore> = match config.backend {
        CacheBackendKind::Memory => Arc::new(MemoryStore::new()),
        CacheBackendKind::Redis => Arc::new(RedisStore::new(&config.redis, connect_timeout)?),
    };
    tracing::info!(backend = store.name(), "Cache store created");
    Ok(store)
}

/// The parts of an inbound request the cache looks at.
#[derive(Debug, Clone, Copy)]
pub struct CacheRequest<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub headers: &'a HeaderMap,
}

/// HTTP-aware cache on top of a [`CacheStore`].
pub struct CacheEngine {
    store: Arc<dyn CacheStore>,
    key_prefix: String,
    fallback_ttl: Duration,
    cookie_denylist: HashSet<String>,
}

impl CacheEngine {
    pub fn new(store: Arc<dyn CacheStore>, config: &ProxyConfig) -> Self {
        Self {
            store,
            key_prefix: config.cache.key_prefix.clone(),
            fallback_ttl: Duration::from_secs(config.cache.fallback_ttl_secs),
            cookie_denylist: config.cookie_denylist_set(),
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn fallback_ttl(&self) -> Duration {
        self.fallback_ttl
    }

    /// Key for `req`, folding in the headers a stored response varied on.
    pub async fn key(&self, req: &CacheRequest<'_>) -> String {
        let vary = self.vary_names(req.path).await;
        key::cache_key(&self.key_prefix, req.path, req.query, &vary, req.headers)
    }

    async fn vary_names(&self, path: &str) -> Vec<String> {
        let index_key = key::vary_index_key(&self.key_prefix, path);
        match self.store.get(&index_key).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::debug!(error = %e, path, "Vary index unavailable");
                Vec::new()
            }
        }
    }

    pub fn is_cacheable(&self, req: &CacheRequest<'_>, status: StatusCode, response_headers: &HeaderMap) -> bool {
        policy::is_cacheable(req.method, req.headers, status, response_headers, &self.cookie_denylist)
    }

    pub fn ttl(&self, entry: &CacheEntry) -> Duration {
        policy::ttl(entry, self.fallback_ttl)
    }

    /// Fetch a live entry. Errors, undecodable data and expired entries are misses.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Cache read failed, treating as miss");
                metrics::record_cache_event("read_error");
                return None;
            }
        };

        let entry = match CacheEntry::from_bytes(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding undecodable cache entry");
                metrics::record_cache_event("read_error");
                return None;
            }
        };

        if policy::is_expired(&entry, now_ms(), self.fallback_ttl) {
            return None;
        }
        Some(entry)
    }

    /// Store `entry` for `req`. Best-effort: failures are logged, not returned.
    pub async fn set(&self, req: &CacheRequest<'_>, response_headers: &HeaderMap, entry: &CacheEntry) {
        if let Err(e) = self.try_set(req, response_headers, entry).await {
            tracing::warn!(error = %e, path = req.path, "Cache write failed");
            metrics::record_cache_event("store_error");
        }
    }

    async fn try_set(
        &self,
        req: &CacheRequest<'_>,
        response_headers: &HeaderMap,
        entry: &CacheEntry,
    ) -> Result<(), CacheError> {
        let ttl = self.ttl(entry);
        if ttl.is_zero() {
            tracing::debug!(path = req.path, "Response already expired, not storing");
            return Ok(());
        }

        let vary = match Vary::from_headers(response_headers) {
            Vary::Names(names) => names,
            Vary::Any => return Ok(()),
        };

        let index_key = key::vary_index_key(&self.key_prefix, req.path);
        if vary.is_empty() {
            self.store.delete(&index_key).await?;
        } else {
            self.store.set(&index_key, serde_json::to_vec(&vary)?, ttl).await?;
        }

        let key = key::cache_key(&self.key_prefix, req.path, req.query, &vary, req.headers);
        self.store.set(&key, entry.to_bytes()?, ttl).await?;

        tracing::debug!(path = req.path, ttl_ms = ttl.as_millis() as u64, "Response cached");
        metrics::record_cache_event("store");
        Ok(())
    }
}

/// Current time as unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
