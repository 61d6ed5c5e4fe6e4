//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML/JSON)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → handed to http::state::ProxyState
//!
//! On reload (SIGHUP or file change):
//!     watcher.rs / lifecycle::signals detect change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → ProxyState::reload builds the next snapshot
//!     → atomic swap of Arc<ProxySnapshot>
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    CacheBackendKind, CacheConfig, ListenerConfig, LogFormat, MimeTypeConfig,
    ObservabilityConfig, PluginRef, PluginsConfig, ProxyConfig, RedisConfig, TimeoutConfig,
};
pub use validation::ValidationError;
