//! # Cache Store Backends
//!
//! The store adapter is the only shared mutable resource in the proxy. Both
//! implementations expose identical semantics behind [`CacheStore`] and a
//! uniform [`StoreStats`] shape, so no caller ever needs to know which
//! backend was selected.

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use crate::caching::CacheResult;
use crate::core::config::{StoreBackend, StoreConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Trait for cache store implementations.
///
/// `get` returns `Ok(None)` on a miss and only errors on backend failure;
/// callers treat backend failures as misses. `set` is best-effort from the
/// caller's point of view: failures are logged at the call site and never
/// propagated to the request.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a value from the cache.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Set a value in the cache with a TTL.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;

    /// Get store statistics.
    async fn stats(&self) -> CacheResult<StoreStats>;

    /// Perform a health check.
    async fn health_check(&self) -> CacheResult<bool>;
}

/// Uniform statistics shape for every backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of live entries.
    pub entries: usize,

    /// Number of hits.
    pub hits: u64,

    /// Number of misses.
    pub misses: u64,

    /// Number of entries evicted to make space.
    pub evictions: u64,

    /// Number of backend errors observed.
    pub errors: u64,
}

/// Construct the configured store backend.
///
/// Connection establishment for the networked backend is bounded by the
/// configured timeout; if Redis cannot be reached in time the proxy
/// proceeds with the in-process cache instead. Degraded, never failed:
/// a request must not be lost to a slow cache backend.
pub async fn connect_store(config: &StoreConfig) -> Arc<dyn CacheStore> {
    match config.backend {
        StoreBackend::Memory => {
            info!(max_entries = config.memory.max_entries, "Using in-memory cache store");
            Arc::new(MemoryStore::new(config.memory.clone()))
        }
        StoreBackend::Redis => {
            let connect = RedisStore::connect(config.redis.clone());
            match tokio::time::timeout(config.redis.connect_timeout, connect).await {
                Ok(Ok(store)) => {
                    info!(url = %config.redis.url, "Using Redis cache store");
                    Arc::new(store)
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Redis unavailable, falling back to in-memory cache");
                    Arc::new(MemoryStore::new(config.memory.clone()))
                }
                Err(_) => {
                    warn!(
                        timeout = ?config.redis.connect_timeout,
                        "Redis connection timed out, falling back to in-memory cache"
                    );
                    Arc::new(MemoryStore::new(config.memory.clone()))
                }
            }
        }
    }
}
