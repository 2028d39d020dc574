//! # Space Data Proxy - Core Library Crate
//!
//! A caching reverse-proxy core that sits in front of a set of rate-limited,
//! latency-variable space-data HTTP APIs (picture of the day, Earth imagery,
//! space-weather notifications, rover photos, planetary weather).
//!
//! The crate provides the caching and request-orchestration layer only. The
//! HTTP server surface, process bootstrapping, and authentication live in the
//! consuming application; this library is wired together behind them with
//! explicit constructor injection (no global cache singletons).
//!
//! ## Architecture
//!
//! 1. **Cache key normalization** ([`caching::key`]) - semantically equivalent
//!    request URLs collapse to one canonical key.
//! 2. **Cache stores** ([`caching::stores`]) - a pluggable async store trait
//!    with in-memory and Redis implementations sharing identical semantics.
//! 3. **TTL rules** ([`caching::ttl`]) - ordered first-match-wins per-endpoint
//!    cache durations with distinct success and failure TTLs.
//! 4. **Date-gated fetching** ([`proxy::fetch`]) - rejects dates that have not
//!    begun anywhere on Earth, short-circuits on cache hits, and extends
//!    negative caching for dates that may still be backfilled upstream.
//! 5. **Notification caching** ([`proxy::notifications`]) - derives the cache
//!    TTL from the freshness of the feed itself and only caches responses
//!    that were successfully enriched.
//! 6. **Enrichment memoization** ([`enrichment`]) - content-addressed caching
//!    of a slow LLM extraction call, paid once per distinct report body.

pub mod caching;
pub mod core;
pub mod enrichment;
pub mod proxy;

pub use crate::core::config::ProxyConfig;
pub use crate::core::error::{ProxyError, ProxyResult};
pub use crate::core::types::{
    CacheStatus, InboundRequest, ProxyResponse, ReportItem, UpstreamResponse,
};

pub use caching::stores::{connect_store, CacheStore, MemoryStore, RedisStore};
pub use caching::ttl::{RouteTtl, TtlPolicy, TtlRule};
pub use enrichment::{EnrichmentMemoizer, ExtractionError, Extractor};
pub use proxy::fetch::FetchOrchestrator;
pub use proxy::notifications::{NotificationService, NotificationsResult};
pub use proxy::upstream::{HttpFetcher, UpstreamFetcher};
