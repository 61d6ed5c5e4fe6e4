//! Response handling and transformation.
//!
//! # Responsibilities
//! - Stamp the version and cache-status headers
//! - Rebuild responses from cache entries
//! - Fix up framing headers after a body was rewritten
//!
//! # Design Decisions
//! - Pass-through responses stream; only processed bodies are buffered
//! - Hop-by-hop headers stripped automatically
//! - Upstream failures map to 502 Bad Gateway

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::cache::CacheEntry;

pub const X_PROXY_VERSION: &str = "x-markup-proxy-version";
pub const X_PROXY_CACHE: &str = "x-markup-proxy-cache";

/// Version reported in [`X_PROXY_VERSION`].
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

pub fn stamp_version(headers: &mut HeaderMap) {
    headers.insert(X_PROXY_VERSION, HeaderValue::from_static(VERSION));
}

pub fn stamp_cache_status(headers: &mut HeaderMap, status: CacheStatus) {
    headers.insert(X_PROXY_CACHE, HeaderValue::from_static(status.as_str()));
}

/// Set `Content-Length` for a body of `len` bytes and drop chunked framing.
pub fn set_content_length(headers: &mut HeaderMap, len: usize) {
    headers.remove(header::TRANSFER_ENCODING);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
}

/// Media type without parameters, lowercased.
pub fn mime_type(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let mime = value.split(';').next()?.trim().to_ascii_lowercase();
    (!mime.is_empty()).then_some(mime)
}

/// True when the body is compressed or otherwise encoded.
pub fn has_content_encoding(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| !v.trim().is_empty() && !v.trim().eq_ignore_ascii_case("identity"))
        .unwrap_or(false)
}

/// Headers worth keeping in a cache entry. Per-request headers are left out.
pub fn storable_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| {
            !matches!(
                name.as_str(),
                X_PROXY_CACHE | X_PROXY_VERSION | "x-request-id" | "content-length" | "date"
            )
        })
        .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
        .collect()
}

/// Rebuild a response from a cache entry, stamped as a HIT.
pub fn replay(entry: CacheEntry) -> Response {
    let status = StatusCode::from_u16(entry.status).unwrap_or(StatusCode::OK);
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, value) in &entry.headers {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            continue;
        };
        headers.append(name, value);
    }
    set_content_length(headers, entry.body.len());
    stamp_version(headers);
    stamp_cache_status(headers, CacheStatus::Hit);

    *response.body_mut() = Body::from(entry.body);
    response
}

/// 502 for a backend that could not be reached or read.
pub fn bad_gateway() -> Response {
    let mut response = (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
    stamp_version(response.headers_mut());
    response
}
