//! Process lifecycle: startup, signals, shutdown.
//!
//! # Data Flow
//! ```text
//! startup.rs:  config file + CLI overrides → logging/metrics → ProxyState
//!              (plugins loaded, fail closed) → bind → serve
//! signals.rs:  SIGTERM/SIGINT → Shutdown::trigger
//!              SIGHUP → load_config → reload channel → ProxyState::reload
//! shutdown.rs: broadcast to the server → graceful drain
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, StartupError, StartupOptions};
