//! # In-Memory Cache Store
//!
//! A bounded in-process cache backed by a concurrent map, with per-entry
//! TTLs, expiry on read, and a background sweep of expired entries. When
//! the entry cap is reached, expired entries are dropped first and the
//! oldest live entries after that.

use super::{CacheStore, StoreStats};
use crate::caching::CacheResult;
use crate::core::config::MemoryStoreConfig;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::interval;
use tracing::debug;

#[derive(Debug, Clone)]
struct StoreEntry {
    value: Vec<u8>,
    created_at: u64,
    expires_at: u64,
}

impl StoreEntry {
    fn new(value: Vec<u8>, ttl: Duration) -> Self {
        let now = epoch_secs();
        Self {
            value,
            created_at: now,
            expires_at: now.saturating_add(ttl.as_secs()),
        }
    }

    fn is_expired(&self) -> bool {
        epoch_secs() > self.expires_at
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// In-process bounded cache store.
pub struct MemoryStore {
    config: MemoryStoreConfig,
    entries: Arc<DashMap<String, StoreEntry>>,

    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    evictions: Arc<AtomicU64>,

    cleanup_task: tokio::task::JoinHandle<()>,
}

impl MemoryStore {
    /// Create a new store and start its expiry-sweep task.
    pub fn new(config: MemoryStoreConfig) -> Self {
        let entries: Arc<DashMap<String, StoreEntry>> = Arc::new(DashMap::new());

        let cleanup_task = {
            let entries = entries.clone();
            let cleanup_interval = config.cleanup_interval;
            tokio::spawn(async move {
                let mut ticker = interval(cleanup_interval);
                loop {
                    ticker.tick().await;
                    let before = entries.len();
                    entries.retain(|_, entry| !entry.is_expired());
                    // Concurrent inserts during the retain can grow the map
                    // past `before`; the count must not underflow.
                    let swept = before.saturating_sub(entries.len());
                    if swept > 0 {
                        debug!(swept, "Swept expired cache entries");
                    }
                }
            })
        };

        Self {
            config,
            entries,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            evictions: Arc::new(AtomicU64::new(0)),
            cleanup_task,
        }
    }

    /// Make room for one more entry if the cap is reached: drop expired
    /// entries first, then the oldest live ones.
    fn evict_if_full(&self) {
        if self.entries.len() < self.config.max_entries {
            return;
        }

        self.entries.retain(|_, entry| !entry.is_expired());
        // Capture the length once: concurrent sets and expired-entry
        // removals move it under us, and the excess below must be computed
        // from the same value the guard saw.
        let len = self.entries.len();
        if len < self.config.max_entries {
            return;
        }

        let mut by_age: Vec<(String, u64)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().created_at))
            .collect();
        by_age.sort_by_key(|(_, created_at)| *created_at);

        let excess = (len + 1).saturating_sub(self.config.max_entries);
        for (key, _) in by_age.into_iter().take(excess) {
            if self.entries.remove(&key).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        debug!(evicted = excess, "Evicted oldest cache entries to make space");
    }
}

impl Drop for MemoryStore {
    /// The sweep task holds a clone of the entry map; abort it so neither
    /// the ticker nor the map outlives the store.
    fn drop(&mut self) {
        self.cleanup_task.abort();
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                let value = entry.value.clone();
                drop(entry);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(value))
            }
            Some(entry) => {
                drop(entry);
                self.entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        if !self.entries.contains_key(key) {
            self.evict_if_full();
        }
        self.entries
            .insert(key.to_string(), StoreEntry::new(value.to_vec(), ttl));
        Ok(())
    }

    async fn stats(&self) -> CacheResult<StoreStats> {
        Ok(StoreStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            errors: 0,
        })
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(true)
    }
}
