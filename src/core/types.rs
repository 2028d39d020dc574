//! # Core Types Module
//!
//! Request/response data structures shared by the caching and orchestration
//! layers. These types deliberately use plain strings and maps rather than a
//! specific HTTP framework's types: the server surface in front of this
//! crate owns the wire representation and converts at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// An inbound request as handed over by the (external) HTTP layer.
///
/// Only GET requests are candidates for caching; everything else bypasses
/// the caching components entirely.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// HTTP method, uppercase.
    pub method: String,

    /// Request path, unnormalized.
    pub path: String,

    /// Query parameters as provided by the client.
    pub query_params: HashMap<String, String>,
}

impl InboundRequest {
    /// Create a GET request for the given path and query parameters.
    pub fn get<S: Into<String>>(path: S, query_params: HashMap<String, String>) -> Self {
        Self {
            method: "GET".to_string(),
            path: path.into(),
            query_params,
        }
    }

    /// Whether this request may pass through the caching layer at all.
    pub fn is_cacheable(&self) -> bool {
        self.method == "GET"
    }
}

/// A raw upstream response: status, headers, and body bytes.
///
/// The fetch collaborator returns this for any HTTP response it receives;
/// only transport-level failures surface as errors.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

/// Whether a response was served from cache or fetched live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    /// Request was not eligible for caching (non-GET, no cacheable route).
    Bypass,
}

impl CacheStatus {
    /// Value for the `X-Cache` observability header.
    pub fn header_value(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
            Self::Bypass => "BYPASS",
        }
    }
}

/// A response produced by the proxy core, ready for the HTTP layer.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub cache_status: CacheStatus,
}

/// Cache observability headers stamped on every served response: the
/// hit/miss indicator plus a max-age hint mirroring the TTL in effect.
/// Every caching endpoint stamps these the same way.
pub fn cache_headers(cache_status: CacheStatus, ttl: Option<Duration>) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert("X-Cache".to_string(), cache_status.header_value().to_string());
    if let Some(ttl) = ttl {
        headers.insert(
            "Cache-Control".to_string(),
            format!("public, max-age={}", ttl.as_secs()),
        );
    }
    headers
}

impl ProxyResponse {
    /// Build a response with the cache observability headers stamped.
    pub fn new(status: u16, body: Vec<u8>, cache_status: CacheStatus, ttl: Option<Duration>) -> Self {
        Self {
            status,
            headers: cache_headers(cache_status, ttl),
            body,
            cache_status,
        }
    }

    /// Parse the body as JSON. Convenience for callers and tests.
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Message type whose items carry a long-form body worth enriching.
pub const REPORT_MESSAGE_TYPE: &str = "Report";

/// One element of a space-weather notifications response.
///
/// Items are created fresh on every upstream fetch and never persisted as
/// their own entities. Enrichment is attached in place before the containing
/// response is returned; only the enrichment itself is cached, keyed by a
/// hash of `raw_body` independent of the batch it appeared in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportItem {
    /// Upstream message type, e.g. "Report", "CME", "FLR".
    #[serde(rename = "messageType")]
    pub message_type: String,

    /// Upstream message identifier, when present.
    #[serde(rename = "messageID", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    /// When the message was issued.
    #[serde(rename = "messageIssueTime", with = "issue_time_format")]
    pub issue_time: DateTime<Utc>,

    /// Raw long-form message body.
    #[serde(rename = "messageBody", default)]
    pub raw_body: String,

    /// Structured annotation derived from `raw_body`, attached by the
    /// enrichment memoizer. Absent when extraction failed or never ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<serde_json::Value>,
}

impl ReportItem {
    /// Whether this item counts toward the feed-freshness TTL computation.
    pub fn is_report(&self) -> bool {
        self.message_type == REPORT_MESSAGE_TYPE
    }

    /// Whether this item should be routed through the enrichment memoizer.
    pub fn is_enrichable(&self) -> bool {
        self.is_report() && !self.raw_body.trim().is_empty()
    }
}

/// Issue timestamps arrive in two shapes: full RFC 3339 and the upstream's
/// abbreviated `2024-01-01T00:17Z` (no seconds). Accept both on read, emit
/// RFC 3339 on write.
mod issue_time_format {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    const ABBREVIATED: &str = "%Y-%m-%dT%H:%MZ";

    pub fn serialize<S>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&raw, ABBREVIATED)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}
