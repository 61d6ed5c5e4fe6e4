//! HTTP caching rules: what may be stored and for how long.

use std::collections::HashSet;
use std::time::Duration;

use axum::http::{header, HeaderMap, Method, StatusCode};
use chrono::DateTime;

use crate::cache::entry::CacheEntry;

/// The `Cache-Control` directives the engine cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub no_store: bool,
    pub no_cache: bool,
    pub private: bool,
    pub max_age: Option<u64>,
}

impl CacheControl {
    /// Merge every `Cache-Control` header in `headers`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut cc = Self::default();
        for value in headers.get_all(header::CACHE_CONTROL) {
            if let Ok(value) = value.to_str() {
                cc.merge(value);
            }
        }
        cc
    }

    pub fn parse(value: &str) -> Self {
        let mut cc = Self::default();
        cc.merge(value);
        cc
    }

    fn merge(&mut self, value: &str) {
        for directive in value.split(',') {
            let directive = directive.trim();
            let (name, arg) = match directive.split_once('=') {
                Some((n, a)) => (n.trim(), Some(a.trim().trim_matches('"'))),
                None => (directive, None),
            };

            if name.eq_ignore_ascii_case("no-store") {
                self.no_store = true;
            } else if name.eq_ignore_ascii_case("no-cache") {
                self.no_cache = true;
            } else if name.eq_ignore_ascii_case("private") {
                self.private = true;
            } else if name.eq_ignore_ascii_case("max-age") {
                // first valid max-age wins
                if self.max_age.is_none() {
                    self.max_age = arg.and_then(|a| a.parse().ok());
                }
            }
        }
    }

    fn forbids_storage(&self) -> bool {
        self.no_store || self.no_cache || self.private
    }
}

/// Upper bound on any stored lifetime (one year).
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Parse an HTTP date into unix milliseconds. Invalid dates yield `None`.
pub fn parse_expires(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// `Expires` from `headers`, as unix milliseconds.
pub fn expires_from_headers(headers: &HeaderMap) -> Option<i64> {
    headers
        .get(header::EXPIRES)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_expires)
}

/// Names of cookies sent with a request.
fn request_cookie_names(headers: &HeaderMap) -> impl Iterator<Item = &str> {
    headers
        .get_all(header::COOKIE)
        .into_iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| {
            let name = pair.split('=').next()?.trim();
            (!name.is_empty()).then_some(name)
        })
}

/// What `Vary` says about a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vary {
    /// `Vary: *`; never cacheable.
    Any,
    /// Lowercased, sorted, deduplicated header names (possibly empty).
    Names(Vec<String>),
}

impl Vary {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut names = Vec::new();
        for value in headers.get_all(header::VARY) {
            let Ok(value) = value.to_str() else { continue };
            for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                if name == "*" {
                    return Vary::Any;
                }
                names.push(name.to_ascii_lowercase());
            }
        }
        names.sort();
        names.dedup();
        Vary::Names(names)
    }
}

/// Decide whether a response may be stored.
///
/// Requires a GET answered with exactly 200, no `Set-Cookie`, no
/// `no-store`/`no-cache`/`private`, no `Vary: *`, no `Authorization` on the
/// request and no request cookie whose name is denylisted.
pub fn is_cacheable(
    method: &Method,
    request_headers: &HeaderMap,
    status: StatusCode,
    response_headers: &HeaderMap,
    cookie_denylist: &HashSet<String>,
) -> bool {
    if response_headers.contains_key(header::SET_COOKIE) {
        return false;
    }
    if *method != Method::GET || status != StatusCode::OK {
        return false;
    }
    if CacheControl::from_headers(response_headers).forbids_storage() {
        return false;
    }
    if Vary::from_headers(response_headers) == Vary::Any {
        return false;
    }
    if request_headers.contains_key(header::AUTHORIZATION) {
        return false;
    }
    !request_cookie_names(request_headers).any(|name| cookie_denylist.contains(name))
}

/// Lifetime of `entry`: max-age, else Expires minus creation time, else `fallback`.
pub fn ttl(entry: &CacheEntry, fallback: Duration) -> Duration {
    let ttl = if let Some(max_age) = entry.max_age_secs {
        Duration::from_secs(max_age)
    } else if let Some(expires) = entry.expires_at_ms {
        let millis = expires.saturating_sub(entry.created_at_ms).max(0);
        Duration::from_millis(millis as u64)
    } else {
        fallback
    };
    ttl.min(MAX_TTL)
}

/// True once `now_ms` has reached the end of the entry's lifetime.
pub fn is_expired(entry: &CacheEntry, now_ms: i64, fallback: Duration) -> bool {
    let ttl_ms = i64::try_from(ttl(entry, fallback).as_millis()).unwrap_or(i64::MAX);
    now_ms >= entry.created_at_ms.saturating_add(ttl_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, HeaderValue::from_static(v));
        }
        map
    }

    fn entry(max_age: Option<u64>, expires_at_ms: Option<i64>) -> CacheEntry {
        CacheEntry {
            body: Vec::new(),
            headers: Vec::new(),
            status: 200,
            created_at_ms: 1_000_000,
            max_age_secs: max_age,
            expires_at_ms,
        }
    }

    fn cacheable(req: &HeaderMap, method: Method, status: u16, resp: &HeaderMap) -> bool {
        let denylist: HashSet<String> = ["session".to_string()].into();
        is_cacheable(&method, req, StatusCode::from_u16(status).unwrap(), resp, &denylist)
    }

    #[test]
    fn test_cache_control_parsing() {
        let cc = CacheControl::parse("public, Max-Age=\"120\", no-transform");
        assert_eq!(cc.max_age, Some(120));
        assert!(!cc.no_store);

        let cc = CacheControl::parse("no-store, max-age=abc");
        assert!(cc.no_store);
        assert_eq!(cc.max_age, None);
    }

    #[test]
    fn test_plain_get_200_is_cacheable() {
        assert!(cacheable(&HeaderMap::new(), Method::GET, 200, &HeaderMap::new()));
    }

    #[test]
    fn test_non_get_or_non_200() {
        let empty = HeaderMap::new();
        assert!(!cacheable(&empty, Method::POST, 200, &empty));
        assert!(!cacheable(&empty, Method::HEAD, 200, &empty));
        assert!(!cacheable(&empty, Method::GET, 404, &empty));
        assert!(!cacheable(&empty, Method::GET, 206, &empty));
    }

    #[test]
    fn test_set_cookie_never_cacheable() {
        let resp = headers(&[("set-cookie", "a=1")]);
        for method in [Method::GET, Method::POST] {
            for status in [200, 404, 500] {
                assert!(!cacheable(&HeaderMap::new(), method.clone(), status, &resp));
            }
        }
    }

    #[test]
    fn test_cache_control_forbids() {
        for value in ["no-store", "no-cache", "private", "max-age=60, private"] {
            let resp = headers(&[("cache-control", value)]);
            assert!(!cacheable(&HeaderMap::new(), Method::GET, 200, &resp), "{value}");
        }
    }

    #[test]
    fn test_request_side_rules() {
        let empty = HeaderMap::new();
        let auth = headers(&[("authorization", "Bearer x")]);
        assert!(!cacheable(&auth, Method::GET, 200, &empty));

        let denied = headers(&[("cookie", "theme=dark; session=abc")]);
        assert!(!cacheable(&denied, Method::GET, 200, &empty));

        let allowed = headers(&[("cookie", "theme=dark; sessionid=abc")]);
        assert!(cacheable(&allowed, Method::GET, 200, &empty));
    }

    #[test]
    fn test_vary_star() {
        let resp = headers(&[("vary", "Accept-Encoding, *")]);
        assert_eq!(Vary::from_headers(&resp), Vary::Any);
        assert!(!cacheable(&HeaderMap::new(), Method::GET, 200, &resp));

        let resp = headers(&[("vary", "Accept-Language"), ("vary", "accept-encoding, Accept-Language")]);
        assert_eq!(
            Vary::from_headers(&resp),
            Vary::Names(vec!["accept-encoding".into(), "accept-language".into()])
        );
    }

    #[test]
    fn test_ttl_priority() {
        let fallback = Duration::from_secs(3600);
        // max-age beats Expires
        assert_eq!(ttl(&entry(Some(30), Some(1_000_000 + 90_000)), fallback), Duration::from_secs(30));
        assert_eq!(ttl(&entry(None, Some(1_000_000 + 90_000)), fallback), Duration::from_secs(90));
        assert_eq!(ttl(&entry(None, Some(500)), fallback), Duration::ZERO);
        assert_eq!(ttl(&entry(None, None), fallback), fallback);
    }

    #[test]
    fn test_ttl_is_capped() {
        let fallback = Duration::from_secs(3600);
        let huge = CacheControl::parse("max-age=18446744073709551615");
        assert_eq!(huge.max_age, Some(u64::MAX));
        assert_eq!(ttl(&entry(huge.max_age, None), fallback), MAX_TTL);
        assert_eq!(ttl(&entry(None, Some(i64::MAX)), fallback), MAX_TTL);
    }

    #[test]
    fn test_expiry() {
        let e = entry(Some(10), None);
        let fallback = Duration::from_secs(3600);
        assert!(!is_expired(&e, 1_000_000 + 9_999, fallback));
        assert!(is_expired(&e, 1_000_000 + 10_000, fallback));
    }

    #[test]
    fn test_parse_expires() {
        assert_eq!(
            parse_expires("Thu, 01 Jan 1970 00:01:00 GMT"),
            Some(60_000)
        );
        assert_eq!(parse_expires("0"), None);
        assert_eq!(parse_expires("yesterday"), None);
    }
}
