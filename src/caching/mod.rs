//! # Caching Subsystem
//!
//! Cache-key normalization, the TTL rule engine, and the pluggable store
//! backends. The rest of the proxy only ever sees the [`stores::CacheStore`]
//! trait; the backend (in-memory or Redis) is selected once at startup.
//!
//! Store semantics the orchestration layer relies on:
//! - `get` on a missing key is `Ok(None)`, never an error;
//! - a value that fails to deserialize on read is treated as a miss;
//! - `set` is best-effort: callers log failures and carry on uncached.

pub mod key;
pub mod stores;
pub mod ttl;

pub use stores::{connect_store, CacheStore, MemoryStore, RedisStore, StoreStats};
pub use ttl::{RouteTtl, TtlPolicy, TtlRule};

/// Cache operation result.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache store error: {message}")]
    Store { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache not available")]
    Unavailable,
}
