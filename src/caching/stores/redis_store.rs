//! # Redis Cache Store
//!
//! Networked cache backend over a Redis connection manager. Expiry is
//! delegated to Redis via `SET EX`; the proxy never inspects remaining TTL.
//! Deliberately no retry loop here: a failed operation surfaces to the
//! caller, which treats it as a miss (get) or a no-op (set).

use super::{CacheStore, StoreStats};
use crate::caching::{CacheError, CacheResult};
use crate::core::config::RedisStoreConfig;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Redis-backed cache store.
pub struct RedisStore {
    config: RedisStoreConfig,
    connection: ConnectionManager,

    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
}

impl RedisStore {
    /// Establish the connection. Callers bound this with a timeout; see
    /// [`super::connect_store`].
    pub async fn connect(config: RedisStoreConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.as_str()).map_err(CacheError::Redis)?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(CacheError::Redis)?;

        info!(url = %config.url, "Connected to Redis cache");

        Ok(Self {
            config,
            connection,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            errors: Arc::new(AtomicU64::new(0)),
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let full_key = self.full_key(key);
        let mut conn = self.connection.clone();

        match conn.get::<_, Option<Vec<u8>>>(&full_key).await {
            Ok(Some(value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Redis cache hit");
                Ok(Some(value))
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Redis cache miss");
                Ok(None)
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                Err(CacheError::Redis(e))
            }
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let full_key = self.full_key(key);
        let mut conn = self.connection.clone();

        // Redis rejects a zero expiry.
        let ttl_seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(&full_key, value, ttl_seconds)
            .await
            .map_err(|e| {
                self.errors.fetch_add(1, Ordering::Relaxed);
                CacheError::Redis(e)
            })?;

        debug!(key, ttl_seconds, "Set Redis cache key");
        Ok(())
    }

    async fn stats(&self) -> CacheResult<StoreStats> {
        let mut conn = self.connection.clone();
        let pattern = format!("{}*", self.config.key_prefix);

        let mut cursor: u64 = 0;
        let mut entries = 0usize;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(1000)
                .query_async(&mut conn)
                .await
                .map_err(CacheError::Redis)?;
            entries += keys.len();
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(StoreStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            // Redis evicts and expires internally.
            evictions: 0,
            errors: self.errors.load(Ordering::Relaxed),
        })
    }

    async fn health_check(&self) -> CacheResult<bool> {
        let mut conn = self.connection.clone();
        let response: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(CacheError::Redis)?;
        Ok(response == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> RedisStoreConfig {
        RedisStoreConfig {
            url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: "sdp:test:".to_string(),
            connect_timeout: Duration::from_secs(3),
        }
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis instance
    async fn test_set_get_roundtrip() {
        let store = RedisStore::connect(local_config()).await.unwrap();

        store.set("roundtrip", b"value", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("roundtrip").await.unwrap(), Some(b"value".to_vec()));
        assert_eq!(store.get("absent").await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis instance
    async fn test_ttl_expiration() {
        let store = RedisStore::connect(local_config()).await.unwrap();

        store.set("expiring", b"value", Duration::from_secs(1)).await.unwrap();
        assert!(store.get("expiring").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.get("expiring").await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis instance
    async fn test_health_check() {
        let store = RedisStore::connect(local_config()).await.unwrap();
        assert!(store.health_check().await.unwrap());
    }
}
