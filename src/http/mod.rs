//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, proxy handler)
//!     → request.rs (request ID, upstream request rewrite)
//!     → state.rs (snapshot: config, backend, cache, plugins)
//!     → body.rs (bounded read of interceptable bodies)
//!     → response.rs (stamp headers, replay cache entries)
//!     → Send to client
//! ```

pub mod body;
pub mod request;
pub mod response;
pub mod server;
pub mod state;

pub use request::X_REQUEST_ID;
pub use response::{CacheStatus, X_PROXY_CACHE, X_PROXY_VERSION};
pub use server::HttpServer;
pub use state::{BackendTarget, ProxySnapshot, ProxyState, StateError};
