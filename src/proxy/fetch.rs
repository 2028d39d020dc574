//! # Date-Gated Fetch Orchestrator
//!
//! Wraps a single upstream fetch with the full fetch-or-serve state machine:
//!
//! ```text
//! CHECK_FUTURE -> CHECK_CACHE -> FETCHING -> {SUCCESS, NOT_FOUND, OTHER_ERROR}
//! ```
//!
//! - a requested date that has not begun anywhere on Earth is rejected
//!   before any network or store access;
//! - a cache hit short-circuits the fetch entirely;
//! - successes are stored under the route's success TTL;
//! - a 404 for a just-past date stays negatively cached until the date has
//!   begun everywhere (upstream may still backfill it), while a 404 for an
//!   old date gets the route's flat failure TTL;
//! - other upstream errors propagate verbatim and are never cached.
//!
//! The cache-write decision is a pure post-processing step over
//! (status, body, rule); store failures degrade the request to uncached
//! operation instead of failing it.

use crate::caching::key;
use crate::caching::stores::CacheStore;
use crate::caching::ttl::TtlPolicy;
use crate::core::error::{ProxyError, ProxyResult};
use crate::core::types::{CacheStatus, InboundRequest, ProxyResponse};
use crate::proxy::date_gate;
use crate::proxy::upstream::{UpstreamFetcher, UpstreamUrlBuilder};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Query parameter interpreted as a calendar date for gating purposes.
const DATE_PARAM: &str = "date";

/// Serialized form of a cached upstream response. Status travels with the
/// body so negative entries replay as not-found rather than success.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedEnvelope {
    status: u16,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    cached_at: DateTime<Utc>,
}

/// Orchestrates date-keyed single-resource endpoints.
pub struct FetchOrchestrator {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn UpstreamFetcher>,
    policy: TtlPolicy,
    url_builder: UpstreamUrlBuilder,
}

impl FetchOrchestrator {
    pub fn new(
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn UpstreamFetcher>,
        policy: TtlPolicy,
        url_builder: UpstreamUrlBuilder,
    ) -> Self {
        Self {
            store,
            fetcher,
            policy,
            url_builder,
        }
    }

    /// Run the state machine for one inbound request.
    pub async fn handle(&self, request: &InboundRequest) -> ProxyResult<ProxyResponse> {
        if !request.is_cacheable() {
            return self.passthrough(request).await;
        }

        let route = self.policy.ttl_for(&request.path);
        let date = request_date(request)?;
        let now = Utc::now();

        // CHECK_FUTURE: terminate before any network or store access.
        if let Some(date) = date {
            if date_gate::is_future_everywhere(date, now) {
                return Err(ProxyError::validation(format!(
                    "Date {} has not begun anywhere on Earth yet",
                    date
                )));
            }
        }

        // CHECK_CACHE: a hit short-circuits the fetch entirely.
        let cache_key = cache_key_for(request);
        if let Some(envelope) = self.cached_envelope(&cache_key).await {
            debug!(key = %cache_key, status = envelope.status, "Cache hit");
            return replay(envelope, route.success);
        }
        debug!(key = %cache_key, "Cache miss");

        // FETCHING
        let url = self.url_builder.build(&request.path, &request.query_params)?;
        let upstream = self.fetcher.fetch(&url).await?;

        if upstream.is_success() {
            // SUCCESS: store and return.
            let envelope = CachedEnvelope {
                status: upstream.status,
                headers: upstream.headers,
                body: upstream.body.clone(),
                cached_at: now,
            };
            self.store_envelope(&cache_key, &envelope, route.success).await;
            return Ok(ProxyResponse::new(
                upstream.status,
                upstream.body,
                CacheStatus::Miss,
                Some(route.success),
            ));
        }

        if upstream.is_not_found() {
            // NOT_FOUND: negative caching, extended while the date is still
            // ambiguous, when the route opts in via a failure TTL.
            if let Some(flat) = route.failure {
                let ttl = negative_cache_ttl(date, flat, now);
                let envelope = CachedEnvelope {
                    status: upstream.status,
                    headers: upstream.headers,
                    body: upstream.body.clone(),
                    cached_at: now,
                };
                self.store_envelope(&cache_key, &envelope, ttl).await;
            }
            return Err(ProxyError::NotFound {
                body: String::from_utf8(upstream.body).ok(),
            });
        }

        // OTHER_ERROR: propagate verbatim, never cache.
        Err(ProxyError::Upstream {
            status: upstream.status,
            body: String::from_utf8_lossy(&upstream.body).into_owned(),
        })
    }

    /// Non-GET requests bypass every caching component.
    async fn passthrough(&self, request: &InboundRequest) -> ProxyResult<ProxyResponse> {
        let url = self.url_builder.build(&request.path, &request.query_params)?;
        let upstream = self.fetcher.fetch(&url).await?;

        if upstream.is_success() {
            return Ok(ProxyResponse::new(
                upstream.status,
                upstream.body,
                CacheStatus::Bypass,
                None,
            ));
        }
        if upstream.is_not_found() {
            return Err(ProxyError::NotFound {
                body: String::from_utf8(upstream.body).ok(),
            });
        }
        Err(ProxyError::Upstream {
            status: upstream.status,
            body: String::from_utf8_lossy(&upstream.body).into_owned(),
        })
    }

    /// Cache lookup. Backend failures and undecodable entries degrade to a
    /// miss, never an error.
    async fn cached_envelope(&self, cache_key: &str) -> Option<CachedEnvelope> {
        match self.store.get(cache_key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(envelope) => Some(envelope),
                Err(e) => {
                    warn!(key = %cache_key, error = %e, "Undecodable cache entry, treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %cache_key, error = %e, "Cache read failed, proceeding without cache");
                None
            }
        }
    }

    /// Best-effort cache write; a store failure is logged and swallowed.
    async fn store_envelope(&self, cache_key: &str, envelope: &CachedEnvelope, ttl: Duration) {
        let bytes = match serde_json::to_vec(envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %cache_key, error = %e, "Failed to serialize cache entry");
                return;
            }
        };
        if let Err(e) = self.store.set(cache_key, &bytes, ttl).await {
            warn!(key = %cache_key, error = %e, "Cache write failed");
        } else {
            debug!(key = %cache_key, ttl_secs = ttl.as_secs(), "Cached response");
        }
    }
}

/// Canonical cache key for an inbound request: normalized path plus sorted,
/// re-encoded query parameters.
fn cache_key_for(request: &InboundRequest) -> String {
    if request.query_params.is_empty() {
        return key::normalize(&request.path);
    }
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in &request.query_params {
        serializer.append_pair(name, value);
    }
    key::normalize(&format!("{}?{}", request.path, serializer.finish()))
}

/// Parse the date parameter when present. A malformed date is a validation
/// failure, not an upstream one.
fn request_date(request: &InboundRequest) -> ProxyResult<Option<NaiveDate>> {
    match request.query_params.get(DATE_PARAM) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| ProxyError::validation(format!("Invalid date parameter: {}", raw))),
    }
}

/// Duration to negatively cache a not-found result.
///
/// A dated resource that is still future somewhere on Earth may appear
/// upstream at any moment once its date completes; keep the negative entry
/// alive until then, but never for less than the route's flat failure TTL.
fn negative_cache_ttl(date: Option<NaiveDate>, flat: Duration, now: DateTime<Utc>) -> Duration {
    match date {
        None => flat,
        Some(date) => {
            let remaining = date_gate::seconds_until_reached_everywhere(date, now);
            if remaining > flat.as_secs() {
                Duration::from_secs(remaining)
            } else {
                flat
            }
        }
    }
}

/// Rebuild a response from a cached envelope, preserving the stored status.
fn replay(envelope: CachedEnvelope, success_ttl: Duration) -> ProxyResult<ProxyResponse> {
    if envelope.status == 404 {
        return Err(ProxyError::NotFound {
            body: String::from_utf8(envelope.body).ok(),
        });
    }
    Ok(ProxyResponse::new(
        envelope.status,
        envelope.body,
        CacheStatus::Hit,
        Some(success_ttl),
    ))
}
