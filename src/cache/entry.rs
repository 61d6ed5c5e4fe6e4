//! Stored representation of a cached response.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::cache::CacheError;

/// A processed response as written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,
    /// Response headers in received order; repeated names appear repeatedly.
    pub headers: Vec<(String, String)>,
    pub status: u16,
    /// Unix milliseconds at which the entry was built.
    pub created_at_ms: i64,
    pub max_age_secs: Option<u64>,
    /// Unix milliseconds parsed from `Expires`.
    pub expires_at_ms: Option<i64>,
}

impl CacheEntry {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CacheError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CacheError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

mod body_base64 {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_body_is_base64() {
        let entry = CacheEntry {
            body: b"<html>\x00</html>".to_vec(),
            headers: vec![("Content-Type".into(), "text/html".into())],
            status: 200,
            created_at_ms: 1_700_000_000_000,
            max_age_secs: Some(60),
            expires_at_ms: None,
        };

        let bytes = entry.to_bytes().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["body"], STANDARD.encode(b"<html>\x00</html>"));
        assert_eq!(CacheEntry::from_bytes(&bytes).unwrap(), entry);
    }

    #[test]
    fn test_corrupt_bytes_rejected() {
        assert!(matches!(
            CacheEntry::from_bytes(b"not json"),
            Err(CacheError::Serialization(_))
        ));
    }
}
