//! # Configuration Module
//!
//! Startup configuration for the proxy core, parsed from YAML with serde.
//! Durations are human-readable (`"7d"`, `"1h"`) via `humantime-serde`.
//! Configuration is immutable after startup; the TTL rule list in particular
//! is read-only for the life of the process.

use crate::core::error::{ProxyError, ProxyResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Complete configuration for the proxy core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Upstream API settings.
    pub upstream: UpstreamConfig,

    /// Cache store backend selection and tuning.
    pub store: StoreConfig,

    /// TTL policy: default duration plus per-endpoint rules.
    pub ttl: TtlConfig,

    /// Notification-feed dynamic TTL tuning.
    pub notifications: NotificationConfig,

    /// Enrichment memoizer tuning.
    pub enrichment: EnrichmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the upstream space-data API.
    pub base_url: String,

    /// API key appended to upstream requests. Usually supplied via the
    /// `SPACE_PROXY_API_KEY` environment variable rather than the file.
    pub api_key: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.nasa.gov".to_string(),
            api_key: None,
        }
    }
}

/// Which store backend to construct at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Selected backend. Redis falls back to memory when unreachable.
    pub backend: StoreBackend,

    /// In-memory store tuning.
    pub memory: MemoryStoreConfig,

    /// Redis store tuning.
    pub redis: RedisStoreConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            memory: MemoryStoreConfig::default(),
            redis: RedisStoreConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStoreConfig {
    /// Maximum number of entries held at once.
    pub max_entries: usize,

    /// How often the background task sweeps expired entries.
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisStoreConfig {
    /// Redis connection URL.
    pub url: String,

    /// Prefix applied to every cache key.
    pub key_prefix: String,

    /// Bound on connection establishment at startup. Past this the proxy
    /// proceeds without the networked cache (degraded, not failed).
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key_prefix: "sdp:cache:".to_string(),
            connect_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    /// Fallback success TTL when no rule matches a path. No rule also
    /// means no negative caching for that path.
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// Ordered rule list; first match wins.
    pub rules: Vec<TtlRuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlRuleConfig {
    /// Substring matched against the unnormalized request path.
    pub pattern: String,

    /// TTL for 2xx responses.
    #[serde(with = "humantime_serde")]
    pub success_ttl: Duration,

    /// Flat minimum TTL for 404 responses; absent means 404s are not cached.
    #[serde(default, with = "humantime_serde::option")]
    pub failure_ttl: Option<Duration>,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            rules: vec![
                // Space-weather notifications: stable once issued, but 404s
                // clear up within a day as the feed backfills.
                TtlRuleConfig {
                    pattern: "/DONKI/notifications".to_string(),
                    success_ttl: days(7),
                    failure_ttl: Some(days(1)),
                },
                // Earth imagery is immutable once published.
                TtlRuleConfig {
                    pattern: "/EPIC/".to_string(),
                    success_ttl: days(30),
                    failure_ttl: Some(Duration::from_secs(3600)),
                },
                TtlRuleConfig {
                    pattern: "/planetary/apod".to_string(),
                    success_ttl: days(1),
                    failure_ttl: Some(Duration::from_secs(3600)),
                },
                TtlRuleConfig {
                    pattern: "/mars-photos/".to_string(),
                    success_ttl: days(7),
                    failure_ttl: None,
                },
                TtlRuleConfig {
                    pattern: "/insight_weather/".to_string(),
                    success_ttl: Duration::from_secs(3600),
                    failure_ttl: None,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Expected spacing between feed items: a newer item is anticipated
    /// this long after the latest known one.
    #[serde(with = "humantime_serde")]
    pub lookahead_window: Duration,

    /// Dynamic TTLs below this fall back to the route's default.
    #[serde(with = "humantime_serde")]
    pub min_dynamic_ttl: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            lookahead_window: days(6),
            min_dynamic_ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// TTL for cached extraction results. Content-addressed entries are
    /// immutable, so this is effectively a storage bound, not a freshness
    /// bound.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self { ttl: days(30) }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            store: StoreConfig::default(),
            ttl: TtlConfig::default(),
            notifications: NotificationConfig::default(),
            enrichment: EnrichmentConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Load configuration from a YAML file, apply environment overrides,
    /// and validate.
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> ProxyResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProxyError::internal(format!("Failed to read config file: {}", e)))?;

        let mut config: ProxyConfig = serde_yaml::from_str(&content)
            .map_err(|e| ProxyError::internal(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Environment overrides. Only the API key is sensitive enough to
    /// warrant one.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("SPACE_PROXY_API_KEY") {
            if !key.is_empty() {
                self.upstream.api_key = Some(key);
            }
        }
    }

    /// Validate the configuration, returning the first problem found.
    pub fn validate(&self) -> ProxyResult<()> {
        Url::parse(&self.upstream.base_url).map_err(|e| {
            ProxyError::internal(format!(
                "Invalid upstream base_url '{}': {}",
                self.upstream.base_url, e
            ))
        })?;

        if self.ttl.default_ttl.is_zero() {
            return Err(ProxyError::internal("ttl.default_ttl must be non-zero"));
        }

        for rule in &self.ttl.rules {
            if rule.pattern.is_empty() {
                return Err(ProxyError::internal("TTL rule pattern must be non-empty"));
            }
        }

        if self.notifications.lookahead_window.is_zero() {
            return Err(ProxyError::internal(
                "notifications.lookahead_window must be non-zero",
            ));
        }

        Ok(())
    }
}

const fn days(n: u64) -> Duration {
    Duration::from_secs(n * 24 * 60 * 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        ProxyConfig::default().validate().unwrap();
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let mut config = ProxyConfig::default();
        config.upstream.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_rule_pattern_rejected() {
        let mut config = ProxyConfig::default();
        config.ttl.rules.push(TtlRuleConfig {
            pattern: String::new(),
            success_ttl: Duration::from_secs(60),
            failure_ttl: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_roundtrip_with_human_durations() {
        let yaml = r#"
upstream:
  base_url: "https://api.example.com"
ttl:
  default_ttl: "2h"
  rules:
    - pattern: "/DONKI/notifications"
      success_ttl: "7d"
      failure_ttl: "1d"
notifications:
  lookahead_window: "6d"
  min_dynamic_ttl: "1h"
"#;
        let config: ProxyConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.ttl.default_ttl, Duration::from_secs(7200));
        assert_eq!(config.ttl.rules.len(), 1);
        assert_eq!(
            config.ttl.rules[0].failure_ttl,
            Some(Duration::from_secs(86400))
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_env_override_sets_api_key() {
        std::env::set_var("SPACE_PROXY_API_KEY", "test-key-123");
        let mut config = ProxyConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.upstream.api_key.as_deref(), Some("test-key-123"));
        std::env::remove_var("SPACE_PROXY_API_KEY");
    }
}
