//! # Notification Feed Service
//!
//! Space-weather notifications are a feed whose cadence is known: a new
//! weekly report is expected within a bounded window after the latest one.
//! Instead of a fixed TTL, the cached feed expires when that window does,
//! so a freshly-issued report shortens the cache lifetime and a stale feed
//! is re-checked sooner.
//!
//! Enrichment happens on the miss path, before the response is cached, so a
//! cache hit serves fully-enriched items without touching the extractor. A
//! response in which nothing was successfully enriched is served but never
//! cached; the next request retries the whole pipeline rather than pinning
//! a degraded result for days.

use crate::caching::key;
use crate::caching::stores::CacheStore;
use crate::caching::ttl::TtlPolicy;
use crate::core::config::NotificationConfig;
use crate::core::error::{ProxyError, ProxyResult};
use crate::core::types::{cache_headers, CacheStatus, ReportItem};
use crate::enrichment::EnrichmentMemoizer;
use crate::proxy::upstream::{UpstreamFetcher, UpstreamUrlBuilder};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Upstream path of the notifications feed.
pub const NOTIFICATIONS_PATH: &str = "/DONKI/notifications";

/// Query parameters that select feed content; everything else is ignored
/// for keying.
const RELEVANT_PARAMS: &[&str] = &["startDate", "endDate", "type"];

/// A served notifications response.
#[derive(Debug, Clone)]
pub struct NotificationsResult {
    /// Feed items in upstream order, enriched where possible.
    pub items: Vec<ReportItem>,

    /// Whether the response came from cache.
    pub cache_status: CacheStatus,

    /// TTL written on a miss (`None` when the response was not cached).
    pub ttl: Option<Duration>,

    /// Cache observability headers, stamped the same way as every other
    /// cached endpoint's response.
    pub headers: HashMap<String, String>,
}

/// Caching service for the notifications feed.
pub struct NotificationService {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn UpstreamFetcher>,
    memoizer: EnrichmentMemoizer,
    url_builder: UpstreamUrlBuilder,
    config: NotificationConfig,
    route_ttl: Duration,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn UpstreamFetcher>,
        memoizer: EnrichmentMemoizer,
        url_builder: UpstreamUrlBuilder,
        config: NotificationConfig,
        policy: &TtlPolicy,
    ) -> Self {
        let route_ttl = policy.ttl_for(NOTIFICATIONS_PATH).success;
        Self {
            store,
            fetcher,
            memoizer,
            url_builder,
            config,
            route_ttl,
        }
    }

    /// Serve the feed for the given query parameters.
    pub async fn handle(
        &self,
        params: &HashMap<String, String>,
    ) -> ProxyResult<NotificationsResult> {
        let cache_key = key::key_from_params(NOTIFICATIONS_PATH, params, RELEVANT_PARAMS);

        if let Some(items) = self.cached_items(&cache_key).await {
            debug!(key = %cache_key, items = items.len(), "Notifications cache hit");
            return Ok(NotificationsResult {
                items,
                cache_status: CacheStatus::Hit,
                ttl: None,
                headers: cache_headers(CacheStatus::Hit, Some(self.route_ttl)),
            });
        }
        debug!(key = %cache_key, "Notifications cache miss");

        let url = self.url_builder.build(NOTIFICATIONS_PATH, params)?;
        let upstream = self.fetcher.fetch(&url).await?;

        if upstream.is_not_found() {
            return Err(ProxyError::NotFound {
                body: String::from_utf8(upstream.body).ok(),
            });
        }
        if !upstream.is_success() {
            return Err(ProxyError::Upstream {
                status: upstream.status,
                body: String::from_utf8_lossy(&upstream.body).into_owned(),
            });
        }

        let mut items = parse_items(&upstream.body)?;
        self.memoizer.enrich(&mut items).await;

        let now = Utc::now();
        let ttl = dynamic_ttl(
            &items,
            self.config.lookahead_window,
            self.config.min_dynamic_ttl,
            self.route_ttl,
            now,
        );

        // Cache only when enrichment produced something: a fully-unenriched
        // response usually means the extraction backend was down, and pinning
        // that for days would defeat the retry.
        let applied_ttl = if items.iter().any(|item| item.enrichment.is_some()) {
            self.store_items(&cache_key, &items, ttl).await;
            Some(ttl)
        } else {
            debug!(key = %cache_key, "No items enriched, serving without caching");
            None
        };

        Ok(NotificationsResult {
            items,
            cache_status: CacheStatus::Miss,
            ttl: applied_ttl,
            headers: cache_headers(CacheStatus::Miss, applied_ttl),
        })
    }

    async fn cached_items(&self, cache_key: &str) -> Option<Vec<ReportItem>> {
        match self.store.get(cache_key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(items) => Some(items),
                Err(e) => {
                    warn!(key = %cache_key, error = %e, "Undecodable feed entry, treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %cache_key, error = %e, "Feed cache read failed, proceeding without cache");
                None
            }
        }
    }

    async fn store_items(&self, cache_key: &str, items: &[ReportItem], ttl: Duration) {
        let bytes = match serde_json::to_vec(items) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %cache_key, error = %e, "Failed to serialize feed entry");
                return;
            }
        };
        if let Err(e) = self.store.set(cache_key, &bytes, ttl).await {
            warn!(key = %cache_key, error = %e, "Feed cache write failed");
        } else {
            debug!(key = %cache_key, ttl_secs = ttl.as_secs(), "Cached notifications feed");
        }
    }
}

/// Parse the upstream feed body, tolerating individually malformed items.
///
/// The body must be a JSON array; elements that fail to parse as items are
/// logged and skipped, preserving the order of the rest. A non-array body is
/// an upstream contract violation and fails the request.
fn parse_items(body: &[u8]) -> ProxyResult<Vec<ReportItem>> {
    let values: Vec<serde_json::Value> = serde_json::from_slice(body).map_err(|e| {
        ProxyError::internal(format!("Notifications feed is not a JSON array: {}", e))
    })?;

    let mut items = Vec::with_capacity(values.len());
    for value in values {
        match serde_json::from_value::<ReportItem>(value) {
            Ok(item) => items.push(item),
            Err(e) => warn!(error = %e, "Skipping malformed feed item"),
        }
    }
    Ok(items)
}

/// Derive the feed TTL from its own freshness.
///
/// The next report is anticipated `lookahead` after the latest one present;
/// the cache entry should live exactly until that anticipated arrival. When
/// the remainder is too small to be useful (or already elapsed), and when
/// the feed contains no reports at all, the route's flat TTL applies.
fn dynamic_ttl(
    items: &[ReportItem],
    lookahead: Duration,
    min_dynamic: Duration,
    default: Duration,
    now: DateTime<Utc>,
) -> Duration {
    let Some(latest) = items
        .iter()
        .filter(|item| item.is_report())
        .map(|item| item.issue_time)
        .max()
    else {
        return default;
    };

    let expires_at = latest + chrono::Duration::from_std(lookahead).unwrap_or_default();
    let remaining = (expires_at - now).num_seconds();
    if remaining > min_dynamic.as_secs() as i64 {
        Duration::from_secs(remaining as u64)
    } else {
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::stores::MemoryStore;
    use crate::core::config::{MemoryStoreConfig, UpstreamConfig};
    use crate::core::types::UpstreamResponse;
    use crate::enrichment::{ExtractionError, Extractor};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DAY: u64 = 86400;

    fn item(message_type: &str, issue_time: &str, body: &str) -> ReportItem {
        ReportItem {
            message_type: message_type.to_string(),
            message_id: None,
            issue_time: DateTime::parse_from_rfc3339(issue_time)
                .unwrap()
                .with_timezone(&Utc),
            raw_body: body.to_string(),
            enrichment: None,
        }
    }

    #[test]
    fn test_dynamic_ttl_from_latest_report() {
        let now = DateTime::parse_from_rfc3339("2024-01-10T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let items = vec![
            item("Report", "2024-01-02T00:00:00Z", "older"),
            item("Report", "2024-01-08T00:00:00Z", "latest"),
            // Non-reports never drive the TTL, even when newer.
            item("CME", "2024-01-09T12:00:00Z", "alert"),
        ];

        // Latest report + 6d lookahead = 2024-01-14; four days remain.
        let ttl = dynamic_ttl(
            &items,
            Duration::from_secs(6 * DAY),
            Duration::from_secs(3600),
            Duration::from_secs(7 * DAY),
            now,
        );
        assert_eq!(ttl, Duration::from_secs(4 * DAY));
    }

    #[test]
    fn test_dynamic_ttl_falls_back_when_window_elapsed() {
        let now = DateTime::parse_from_rfc3339("2024-02-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let items = vec![item("Report", "2024-01-01T00:00:00Z", "stale")];

        let ttl = dynamic_ttl(
            &items,
            Duration::from_secs(6 * DAY),
            Duration::from_secs(3600),
            Duration::from_secs(7 * DAY),
            now,
        );
        assert_eq!(ttl, Duration::from_secs(7 * DAY));
    }

    #[test]
    fn test_dynamic_ttl_falls_back_below_minimum() {
        let now = DateTime::parse_from_rfc3339("2024-01-06T23:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        // Window expires in 30 minutes: below the 1h minimum.
        let items = vec![item("Report", "2024-01-01T00:00:00Z", "body")];

        let ttl = dynamic_ttl(
            &items,
            Duration::from_secs(6 * DAY),
            Duration::from_secs(3600),
            Duration::from_secs(7 * DAY),
            now,
        );
        assert_eq!(ttl, Duration::from_secs(7 * DAY));
    }

    #[test]
    fn test_dynamic_ttl_without_reports_uses_default() {
        let now = Utc::now();
        let items = vec![item("FLR", "2024-01-01T00:00:00Z", "flare")];
        let ttl = dynamic_ttl(
            &items,
            Duration::from_secs(6 * DAY),
            Duration::from_secs(3600),
            Duration::from_secs(7 * DAY),
            now,
        );
        assert_eq!(ttl, Duration::from_secs(7 * DAY));
        assert_eq!(
            dynamic_ttl(
                &[],
                Duration::from_secs(6 * DAY),
                Duration::from_secs(3600),
                Duration::from_secs(7 * DAY),
                now
            ),
            Duration::from_secs(7 * DAY)
        );
    }

    #[test]
    fn test_parse_items_skips_malformed_preserving_order() {
        let body = serde_json::json!([
            {"messageType": "Report", "messageIssueTime": "2024-01-01T00:17Z", "messageBody": "a"},
            {"messageType": "Report", "messageIssueTime": "not a time", "messageBody": "broken"},
            {"messageType": "CME", "messageIssueTime": "2024-01-02T00:17Z", "messageBody": "c"},
        ]);
        let items = parse_items(&serde_json::to_vec(&body).unwrap()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].raw_body, "a");
        assert_eq!(items[1].raw_body, "c");
    }

    #[test]
    fn test_parse_items_rejects_non_array_body() {
        assert!(parse_items(b"{\"error\": \"rate limited\"}").is_err());
        assert!(parse_items(b"not json").is_err());
    }

    // --- service-level tests -------------------------------------------

    struct FeedFetcher {
        status: u16,
        body: Vec<u8>,
        calls: AtomicUsize,
    }

    impl FeedFetcher {
        fn new(status: u16, body: serde_json::Value) -> Self {
            Self {
                status,
                body: serde_json::to_vec(&body).unwrap(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl UpstreamFetcher for FeedFetcher {
        async fn fetch(&self, _url: &str) -> ProxyResult<UpstreamResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(UpstreamResponse {
                status: self.status,
                headers: HashMap::new(),
                body: self.body.clone(),
            })
        }
    }

    struct JsonExtractor {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Extractor for JsonExtractor {
        async fn extract(&self, _raw_text: &str) -> Result<String, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ExtractionError::backend("down"));
            }
            Ok("{\"summary\": \"extracted\"}".to_string())
        }
    }

    fn service(
        fetcher: Arc<FeedFetcher>,
        extractor: Arc<JsonExtractor>,
    ) -> NotificationService {
        let store: Arc<dyn CacheStore> =
            Arc::new(MemoryStore::new(MemoryStoreConfig::default()));
        let memoizer =
            EnrichmentMemoizer::new(store.clone(), extractor, Duration::from_secs(3600));
        let url_builder = UpstreamUrlBuilder::new(&UpstreamConfig {
            base_url: "https://api.example.com".to_string(),
            api_key: None,
        })
        .unwrap();
        let policy = TtlPolicy::from_config(&crate::core::config::TtlConfig::default());
        NotificationService::new(
            store,
            fetcher,
            memoizer,
            url_builder,
            NotificationConfig::default(),
            &policy,
        )
    }

    fn fresh_feed() -> serde_json::Value {
        let recent = (Utc::now() - chrono::Duration::days(1)).to_rfc3339();
        serde_json::json!([
            {"messageType": "Report", "messageID": "r1", "messageIssueTime": recent, "messageBody": "weekly summary"},
            {"messageType": "CME", "messageIssueTime": "2024-01-01T00:17Z", "messageBody": "alert"},
        ])
    }

    #[tokio::test]
    async fn test_miss_enriches_caches_then_hit_reuses() {
        let fetcher = Arc::new(FeedFetcher::new(200, fresh_feed()));
        let extractor = Arc::new(JsonExtractor {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let service = service(fetcher.clone(), extractor.clone());
        let params = HashMap::new();

        let miss = service.handle(&params).await.unwrap();
        assert_eq!(miss.cache_status, CacheStatus::Miss);
        assert!(miss.ttl.is_some());
        assert_eq!(miss.items.len(), 2);
        assert!(miss.items[0].enrichment.is_some());
        assert!(miss.items[1].enrichment.is_none(), "non-reports stay bare");
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);

        let hit = service.handle(&params).await.unwrap();
        assert_eq!(hit.cache_status, CacheStatus::Hit);
        assert_eq!(hit.items, miss.items, "hit serves pre-enriched items");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            extractor.calls.load(Ordering::SeqCst),
            1,
            "hit must not re-enrich"
        );
    }

    #[tokio::test]
    async fn test_cache_headers_stamped_like_other_endpoints() {
        let fetcher = Arc::new(FeedFetcher::new(200, fresh_feed()));
        let extractor = Arc::new(JsonExtractor {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let service = service(fetcher, extractor);
        let params = HashMap::new();

        let miss = service.handle(&params).await.unwrap();
        assert_eq!(miss.headers.get("X-Cache").unwrap(), "MISS");
        assert_eq!(
            miss.headers.get("Cache-Control").unwrap(),
            &format!("public, max-age={}", miss.ttl.unwrap().as_secs())
        );

        let hit = service.handle(&params).await.unwrap();
        assert_eq!(hit.headers.get("X-Cache").unwrap(), "HIT");
        // Hits advertise the route's flat TTL, as the single-resource
        // endpoints do.
        assert_eq!(
            hit.headers.get("Cache-Control").unwrap(),
            "public, max-age=604800"
        );
    }

    #[tokio::test]
    async fn test_uncached_response_has_no_max_age_hint() {
        let fetcher = Arc::new(FeedFetcher::new(200, fresh_feed()));
        let extractor = Arc::new(JsonExtractor {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let service = service(fetcher, extractor);

        let result = service.handle(&HashMap::new()).await.unwrap();
        assert_eq!(result.headers.get("X-Cache").unwrap(), "MISS");
        assert!(result.headers.get("Cache-Control").is_none());
    }

    #[tokio::test]
    async fn test_dynamic_ttl_applied_on_miss() {
        // Report issued a day ago with a 6-day lookahead: roughly five days
        // of TTL should remain, far above the 7-day flat route value only
        // in sign, but well above the 1h minimum.
        let fetcher = Arc::new(FeedFetcher::new(200, fresh_feed()));
        let extractor = Arc::new(JsonExtractor {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let service = service(fetcher, extractor);

        let result = service.handle(&HashMap::new()).await.unwrap();
        let ttl = result.ttl.unwrap();
        assert!(ttl > Duration::from_secs(4 * DAY) && ttl < Duration::from_secs(6 * DAY));
    }

    #[tokio::test]
    async fn test_unenriched_response_served_but_not_cached() {
        let fetcher = Arc::new(FeedFetcher::new(200, fresh_feed()));
        let extractor = Arc::new(JsonExtractor {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let service = service(fetcher.clone(), extractor);

        let first = service.handle(&HashMap::new()).await.unwrap();
        assert_eq!(first.cache_status, CacheStatus::Miss);
        assert_eq!(first.ttl, None, "degraded response must not be cached");
        assert!(first.items.iter().all(|item| item.enrichment.is_none()));

        // Next request retries the full pipeline.
        let second = service.handle(&HashMap::new()).await.unwrap();
        assert_eq!(second.cache_status, CacheStatus::Miss);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_irrelevant_params_share_cache_entry() {
        let fetcher = Arc::new(FeedFetcher::new(200, fresh_feed()));
        let extractor = Arc::new(JsonExtractor {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let service = service(fetcher.clone(), extractor);

        let mut first = HashMap::new();
        first.insert("startDate".to_string(), "2024-01-01".to_string());
        first.insert("api_key".to_string(), "k1".to_string());
        service.handle(&first).await.unwrap();

        let mut second = HashMap::new();
        second.insert("startDate".to_string(), "2024-01-01".to_string());
        second.insert("api_key".to_string(), "different".to_string());
        let result = service.handle(&second).await.unwrap();

        assert_eq!(result.cache_status, CacheStatus::Hit);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_upstream_error_propagates_uncached() {
        let fetcher = Arc::new(FeedFetcher::new(
            429,
            serde_json::json!({"error": "rate limited"}),
        ));
        let extractor = Arc::new(JsonExtractor {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let service = service(fetcher.clone(), extractor);

        let result = service.handle(&HashMap::new()).await;
        assert!(matches!(
            result,
            Err(ProxyError::Upstream { status: 429, .. })
        ));

        let retry = service.handle(&HashMap::new()).await;
        assert!(retry.is_err());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2, "errors are never cached");
    }
}
