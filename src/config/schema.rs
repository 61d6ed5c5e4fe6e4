//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Content types that may carry a plugin rule.
pub const PROCESSABLE_MIME_TYPES: &[&str] = &[
    "text/html",
    "application/xhtml+xml",
    "text/xml",
    "application/xml",
    "application/rss+xml",
    "application/atom+xml",
];

/// Default ceiling on buffered response bodies, in megabytes.
pub const DEFAULT_MAX_RESPONSE_SIZE_MB: usize = 10;

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Backend every request is forwarded to (e.g. "http://127.0.0.1:8081").
    pub backend_url: String,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Ordered content-type rules, each naming the plugins to run.
    pub mime_types: Vec<MimeTypeConfig>,

    /// Request cookies whose presence makes a response uncacheable.
    pub cookie_denylist: Vec<String>,

    /// Largest response body (in MB) that is buffered for processing.
    pub max_response_size_mb: usize,

    /// Plugin loading settings.
    pub plugins: PluginsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl ProxyConfig {
    /// Returns the rule configured for `mime_type`, if any.
    pub fn rule_for(&self, mime_type: &str) -> Option<&MimeTypeConfig> {
        self.mime_types.iter().find(|rule| rule.mime_type == mime_type)
    }

    /// True when responses of this content type go through the document pipeline.
    pub fn is_processed_mime(&self, mime_type: &str) -> bool {
        self.rule_for(mime_type).is_some()
    }

    /// Cookie denylist as a set for O(1) membership checks.
    pub fn cookie_denylist_set(&self) -> HashSet<String> {
        self.cookie_denylist.iter().cloned().collect()
    }

    /// Effective body ceiling in bytes; zero in the file means the default.
    pub fn max_response_size_bytes(&self) -> usize {
        let mb = if self.max_response_size_mb == 0 {
            DEFAULT_MAX_RESPONSE_SIZE_MB
        } else {
            self.max_response_size_mb
        };
        mb * 1024 * 1024
    }

    /// Every plugin reference across all rules, paired with the rule's content type.
    pub fn plugin_refs(&self) -> impl Iterator<Item = (&str, &PluginRef)> {
        self.mime_types
            .iter()
            .flat_map(|rule| rule.plugins.iter().map(move |p| (rule.mime_type.as_str(), p)))
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrently handled requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Which store backs the response cache.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    Redis,
    Memory,
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Store implementation.
    pub backend: CacheBackendKind,

    /// Redis connection parameters (used when `backend = "redis"`).
    pub redis: RedisConfig,

    /// TTL applied when a response carries neither max-age nor Expires.
    pub fallback_ttl_secs: u64,

    /// Namespace prepended to every key written to the store.
    pub key_prefix: String,
}

impl CacheConfig {
    /// True when switching from `self` to `other` requires a new store client.
    pub fn connection_changed(&self, other: &CacheConfig) -> bool {
        self.backend != other.backend || self.redis != other.redis
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Redis,
            redis: RedisConfig::default(),
            fallback_ttl_secs: 3600,
            key_prefix: "markup-proxy:".to_string(),
        }
    }
}

/// Redis connection parameters.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct RedisConfig {
    /// host:port of the Redis server.
    pub address: String,

    /// Optional AUTH password (empty = none).
    pub password: String,

    /// Logical database index.
    pub database: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:6379".to_string(),
            password: String::new(),
            database: 0,
        }
    }
}

/// A content type and the ordered plugins applied to it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct MimeTypeConfig {
    pub mime_type: String,
    pub plugins: Vec<PluginRef>,
}

/// Reference to an exported plugin symbol inside a shared library.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct PluginRef {
    /// Path to the shared library.
    pub path: String,

    /// Exported symbol name.
    pub name: String,
}

/// Plugin loading configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PluginsConfig {
    /// Directories a plugin file must resolve into. Relative entries are
    /// resolved against the working directory.
    pub allowed_dirs: Vec<PathBuf>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            allowed_dirs: vec![
                PathBuf::from("plugins"),
                PathBuf::from("/opt/markup-proxy/plugins"),
            ],
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds (backend and cache store).
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
