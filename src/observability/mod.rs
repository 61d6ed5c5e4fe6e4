//! Logging and metrics.
//!
//! # Data Flow
//! ```text
//! handler / cache engine / plugin manager / reload
//!     → tracing events (request_id, path, plugin, mime_type fields)
//!         → logging.rs subscriber → stdout (JSON or pretty)
//!     → metrics.rs counters and histogram
//!         → Prometheus recorder (only when metrics_enabled)
//! ```
//!
//! Both are process-global and installed once by `lifecycle::startup`.

pub mod logging;
pub mod metrics;
