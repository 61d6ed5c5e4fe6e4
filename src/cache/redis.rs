//! Redis-backed cache store.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::OnceCell;
use url::Url;

use crate::cache::{CacheError, CacheStore};
use crate::config::RedisConfig;

/// Store talking to a single Redis server.
///
/// The connection is established on first use so the proxy starts (and keeps
/// serving uncached) while Redis is unavailable; a failed attempt is retried
/// on the next operation.
pub struct RedisStore {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
    connect_timeout: Duration,
}

impl RedisStore {
    pub fn new(config: &RedisConfig, connect_timeout: Duration) -> Result<Self, CacheError> {
        let url = connection_url(config)?;
        let client = redis::Client::open(url.as_str())?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
            connect_timeout,
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let connect = ConnectionManager::new(self.client.clone());
                let conn = tokio::time::timeout(self.connect_timeout, connect)
                    .await
                    .map_err(|_| {
                        CacheError::Connection(format!("timed out after {:?}", self.connect_timeout))
                    })??;
                tracing::info!("Connected to Redis");
                Ok::<_, CacheError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }
}

fn connection_url(config: &RedisConfig) -> Result<Url, CacheError> {
    let mut url = Url::parse(&format!("redis://{}/{}", config.address, config.database))
        .map_err(|e| CacheError::Connection(format!("invalid redis address '{}': {}", config.address, e)))?;
    if !config.password.is_empty() {
        url.set_password(Some(&config.password))
            .map_err(|_| CacheError::Connection("cannot encode redis password".to_string()))?;
    }
    Ok(url)
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        conn.pset_ex::<_, _, ()>(key, value, millis).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_url() {
        let config = RedisConfig {
            address: "cache.internal:6380".into(),
            password: "p@ss".into(),
            database: 2,
        };
        let url = connection_url(&config).unwrap();
        assert_eq!(url.host_str(), Some("cache.internal"));
        assert_eq!(url.port(), Some(6380));
        assert_eq!(url.path(), "/2");
        assert!(url.password().is_some());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error_not_a_hang() {
        let config = RedisConfig {
            address: "127.0.0.1:1".into(),
            ..Default::default()
        };
        let store = RedisStore::new(&config, Duration::from_millis(500)).unwrap();
        assert!(store.get("k").await.is_err());
    }
}
