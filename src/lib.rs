//! Markup-processing caching reverse proxy.
//!
//! Responses whose content type has a configured rule are parsed into a
//! document tree, transformed by dynamically loaded plugins, rendered back
//! and cached under HTTP caching rules. Everything else streams through.

pub mod cache;
pub mod config;
pub mod document;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod plugin;
pub mod plugins;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
