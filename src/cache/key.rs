//! Cache key derivation.

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

/// Key for a request: prefix plus the SHA-256 of path, query and the values
/// of every header named in `vary` (lowercased, sorted).
pub fn cache_key(prefix: &str, path: &str, query: Option<&str>, vary: &[String], headers: &HeaderMap) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update(b"?");
    hasher.update(query.unwrap_or("").as_bytes());

    for name in vary {
        hasher.update(b"\n");
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        let mut first = true;
        for value in headers.get_all(name.as_str()) {
            if !first {
                hasher.update(b",");
            }
            hasher.update(value.as_bytes());
            first = false;
        }
    }

    format!("{}{}", prefix, hex::encode(hasher.finalize()))
}

/// Key under which the `Vary` header names last seen for `path` are kept.
pub fn vary_index_key(prefix: &str, path: &str) -> String {
    format!("{}vary:{}", prefix, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const P: &str = "test:";

    #[test]
    fn test_same_request_same_key() {
        let h = HeaderMap::new();
        assert_eq!(
            cache_key(P, "/test", Some("param=value"), &[], &h),
            cache_key(P, "/test", Some("param=value"), &[], &h)
        );
    }

    #[test]
    fn test_path_and_query_distinguish() {
        let h = HeaderMap::new();
        let base = cache_key(P, "/test", Some("param=value"), &[], &h);
        assert_ne!(base, cache_key(P, "/different", Some("param=value"), &[], &h));
        assert_ne!(base, cache_key(P, "/test", Some("param=different"), &[], &h));
        assert_ne!(base, cache_key(P, "/test", None, &[], &h));
        // path/query boundary cannot be shifted
        assert_ne!(
            cache_key(P, "/a", Some("b"), &[], &h),
            cache_key(P, "/a?b", None, &[], &h)
        );
    }

    #[test]
    fn test_vary_headers_distinguish() {
        let vary = vec!["accept-language".to_string()];
        let mut en = HeaderMap::new();
        en.insert("accept-language", HeaderValue::from_static("en"));
        let mut de = HeaderMap::new();
        de.insert("accept-language", HeaderValue::from_static("de"));

        assert_ne!(cache_key(P, "/", None, &vary, &en), cache_key(P, "/", None, &vary, &de));
        // headers outside the vary list are ignored
        assert_eq!(cache_key(P, "/", None, &[], &en), cache_key(P, "/", None, &[], &de));
    }

    #[test]
    fn test_prefix_and_index_key() {
        let key = cache_key("ns:", "/", None, &[], &HeaderMap::new());
        assert!(key.starts_with("ns:"));
        assert_eq!(key.len(), 3 + 64);
        assert_eq!(vary_index_key("ns:", "/feed"), "ns:vary:/feed");
    }
}
