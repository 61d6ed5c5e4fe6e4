//! Key-value stores backing the cache engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::cache::policy::MAX_TTL;
use crate::cache::CacheError;

/// Writes between sweeps of expired memory entries.
const PURGE_EVERY: usize = 256;

/// Minimal byte store with per-key expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value` under `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// In-process store.
///
/// Expired keys are dropped when read, and swept in bulk every
/// `PURGE_EVERY` writes so keys that are never read again do not pile up.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, (Vec<u8>, Instant)>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.value().1 > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, (_, expiry)| *expiry > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|e| e.value().1 > Instant::now())
            .unwrap_or(false)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        let value = match self.entries.get(key) {
            Some(entry) if entry.value().1 > now => return Ok(Some(entry.value().0.clone())),
            Some(_) => None,
            None => return Ok(None),
        };
        // expired: the read guard is released above before removing
        self.entries.remove_if(key, |_, (_, expiry)| *expiry <= now);
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let expiry = now
            .checked_add(ttl)
            .or_else(|| now.checked_add(MAX_TTL))
            .unwrap_or(now);
        self.entries.insert(key.to_string(), (value, expiry));

        if self.writes.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            let purged = self.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Swept expired memory cache entries");
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_expiry() {
        let store = MemoryStore::new();
        store.set("a", b"1".to_vec(), Duration::from_millis(30)).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"1".to_vec()));
        assert!(store.contains_key("a"));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.get("a").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unread_expired_keys_are_swept() {
        let store = MemoryStore::new();
        for i in 0..PURGE_EVERY - 1 {
            store.set(&format!("k{i}"), b"x".to_vec(), Duration::from_millis(1)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.set("live", b"y".to_vec(), Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.entries.len(), 1);
        assert!(store.contains_key("live"));
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_overflow() {
        let store = MemoryStore::new();
        store.set("a", b"1".to_vec(), Duration::from_secs(u64::MAX)).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_store_delete() {
        let store = MemoryStore::new();
        store.set("a", b"1".to_vec(), Duration::from_secs(60)).await.unwrap();
        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }
}
