//! HTTP server setup and the proxy handler.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (timeout, request ID, tracing, concurrency limit)
//! - Serve cached responses, forward everything else to the backend
//! - Intercept configured content types and run the document pipeline
//! - Apply configuration updates arriving on the reload channel
//!
//! # Data Flow
//! ```text
//! request
//!     → GET + live cache entry?  → replay (HIT)
//!     → forward to backend
//!     → not a configured type / not 200 / encoded → pass through
//!     → read body up to the ceiling (oversize → pass through)
//!     → document pipeline (failure → original body)
//!     → cache if eligible → respond (MISS)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{response::Parts, Method, Request, StatusCode},
    response::Response,
    Router,
};
use bytes::Bytes;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use url::Url;

use crate::cache::{now_ms, policy, CacheEntry, CacheRequest};
use crate::config::ProxyConfig;
use crate::document::{self, DocumentError, DocumentKind};
use crate::http::body::{read_bounded, Bounded};
use crate::http::request::{request_id, request_id_layers, strip_hop_by_hop, upstream_request};
use crate::http::response::{self, CacheStatus};
use crate::http::state::{ProxySnapshot, ProxyState, StateError};
use crate::lifecycle::shutdown;
use crate::observability::metrics;
use crate::plugin::PluginContext;
use crate::plugins::{DylibLoader, PluginLoader};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub state: Arc<ProxyState>,
    pub client: Client<HttpConnector, Body>,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    state: Arc<ProxyState>,
    client: Client<HttpConnector, Body>,
}

impl HttpServer {
    /// Create a server loading plugins from native libraries.
    pub fn new(config: ProxyConfig) -> Result<Self, StateError> {
        Self::with_plugin_loader(config, Arc::new(DylibLoader))
    }

    /// Create a server with a custom plugin loader.
    pub fn with_plugin_loader(config: ProxyConfig, loader: Arc<dyn PluginLoader>) -> Result<Self, StateError> {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let state = Arc::new(ProxyState::new(config, loader)?);
        Ok(Self { state, client })
    }

    pub fn state(&self) -> Arc<ProxyState> {
        self.state.clone()
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Listener-level settings (timeout, concurrency) are taken from the
    /// configuration at startup and are not changed by reloads.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let (set_request_id, propagate_request_id) = request_id_layers();
        // a single fallback keeps one concurrency semaphore for every path
        Router::new()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
            .layer(propagate_request_id)
            .layer(set_request_id)
            .layer(ConcurrencyLimitLayer::new(config.listener.max_connections))
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Configurations received on `config_updates` are applied with
    /// [`ProxyState::reload`]; rejected ones are logged and dropped.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let reload_state = self.state.clone();
        let reloader = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                // errors are logged by reload
                let _ = reload_state.reload(config).await;
            }
        });

        let config = self.state.snapshot().config.clone();
        let app_state = AppState {
            state: self.state.clone(),
            client: self.client.clone(),
        };
        let app = Self::build_router(&config, app_state).into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown::wait_for(&mut shutdown).await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
async fn proxy_handler(
    State(app): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start_time = Instant::now();
    let snapshot = app.state.snapshot();

    let request_id = request_id(request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);
    let request_headers = request.headers().clone();
    let request_url = request_url(&request, &snapshot);

    // Fires when this future is dropped (client gone or timeout).
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    tracing::debug!(request_id = %request_id, method = %method, path = %path, "Proxying request");

    let cache_request = CacheRequest {
        method: &method,
        path: &path,
        query: query.as_deref(),
        headers: &request_headers,
    };

    if method == Method::GET {
        let key = snapshot.cache.key(&cache_request).await;
        if let Some(entry) = snapshot.cache.get(&key).await {
            tracing::info!(request_id = %request_id, path = %path, "Serving cached response");
            metrics::record_cache_event("hit");
            let response = response::replay(entry);
            metrics::record_request(method.as_str(), response.status().as_u16(), "hit", start_time);
            return response;
        }
        metrics::record_cache_event("miss");
    }

    let upstream = match upstream_request(request, &snapshot.backend, peer.ip()) {
        Ok(req) => req,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Could not build upstream request");
            metrics::record_request(method.as_str(), 502, "none", start_time);
            return response::bad_gateway();
        }
    };

    let upstream_response = match app.client.request(upstream).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream error");
            metrics::record_request(method.as_str(), 502, "none", start_time);
            return response::bad_gateway();
        }
    };

    let (mut parts, body) = upstream_response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    response::stamp_version(&mut parts.headers);
    let body = Body::new(body);

    let rule = response::mime_type(&parts.headers)
        .and_then(|mime| snapshot.config.rule_for(&mime).map(|rule| (mime, rule.plugins.clone())));

    let Some((mime_type, plugin_refs)) = rule else {
        return pass_through(parts, body, &method, "none", start_time);
    };
    if parts.status != StatusCode::OK || method == Method::HEAD {
        return pass_through(parts, body, &method, "none", start_time);
    }
    if response::has_content_encoding(&parts.headers) {
        tracing::debug!(request_id = %request_id, path = %path, "Encoded body, not processing");
        return pass_through(parts, body, &method, "none", start_time);
    }

    response::stamp_cache_status(&mut parts.headers, CacheStatus::Miss);

    let limit = snapshot.config.max_response_size_bytes();
    let original = match read_bounded(body, limit).await {
        Ok(Bounded::Complete(bytes)) => bytes,
        Ok(Bounded::Overflow(body)) => {
            tracing::warn!(request_id = %request_id, path = %path, limit, "Response exceeds size limit, passing through");
            metrics::record_oversize_bypass();
            return pass_through(parts, body, &method, "miss", start_time);
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed reading upstream body");
            metrics::record_request(method.as_str(), 502, "miss", start_time);
            return response::bad_gateway();
        }
    };

    let deadline = start_time + Duration::from_secs(snapshot.config.timeouts.request_secs);
    let ctx = PluginContext::new(request_id.clone(), Some(deadline), cancel.clone());

    let pipeline = run_pipeline(&snapshot, &mime_type, &plugin_refs, original.clone(), ctx, request_url);
    let (body, processed) = match pipeline.await {
        Ok(rendered) => (Bytes::from(rendered), true),
        Err(e) => {
            if let DocumentError::Plugin { plugin, .. } = &e {
                metrics::record_plugin_failure(&plugin.to_string());
            }
            tracing::warn!(
                request_id = %request_id,
                path = %path,
                mime_type = %mime_type,
                error = %e,
                "Document processing failed, serving original body"
            );
            (original, false)
        }
    };

    response::set_content_length(&mut parts.headers, body.len());

    if processed && snapshot.cache.is_cacheable(&cache_request, parts.status, &parts.headers) {
        let entry = CacheEntry {
            body: body.to_vec(),
            headers: response::storable_headers(&parts.headers),
            status: parts.status.as_u16(),
            created_at_ms: now_ms(),
            max_age_secs: policy::CacheControl::from_headers(&parts.headers).max_age,
            expires_at_ms: policy::expires_from_headers(&parts.headers),
        };
        snapshot.cache.set(&cache_request, &parts.headers, &entry).await;
    }

    metrics::record_request(method.as_str(), parts.status.as_u16(), "miss", start_time);
    Response::from_parts(parts, Body::from(body))
}

fn pass_through(parts: Parts, body: Body, method: &Method, cache: &str, start_time: Instant) -> Response {
    metrics::record_request(method.as_str(), parts.status.as_u16(), cache, start_time);
    Response::from_parts(parts, body)
}

async fn run_pipeline(
    snapshot: &ProxySnapshot,
    mime_type: &str,
    plugin_refs: &[crate::config::PluginRef],
    body: Bytes,
    ctx: PluginContext,
    url: Option<Url>,
) -> Result<Vec<u8>, DocumentError> {
    let url = url.ok_or_else(|| DocumentError::Parse("request URL is not valid".to_string()))?;
    let kind = DocumentKind::for_mime(mime_type)
        .ok_or_else(|| DocumentError::Parse(format!("no document kind for '{}'", mime_type)))?;
    let plugins = document::resolve_plugins(plugin_refs, &snapshot.plugins)?;

    tokio::task::spawn_blocking(move || document::process(kind, &body, &plugins, &ctx, &url))
        .await
        .map_err(|e| DocumentError::Render(format!("pipeline task failed: {}", e)))?
}

/// Absolute URL of the inbound request, as plugins see it.
fn request_url(request: &Request<Body>, snapshot: &ProxySnapshot) -> Option<Url> {
    let host = request
        .headers()
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| snapshot.backend.authority().to_string());
    let pq = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    Url::parse(&format!("http://{}{}", host, pq)).ok()
}
