//! # TTL Rule Engine
//!
//! A small ordered list of (pattern, success TTL, failure TTL) rules matched
//! against the unnormalized request path. Rules are declared once at startup
//! and are immutable afterwards; evaluation is first-match-wins, which lets
//! an earlier broad rule intentionally shadow a later narrow one.
//!
//! A path with no matching rule gets the global default success TTL and no
//! failure TTL, i.e. the conservative policy: cache successes briefly, never
//! negatively cache.

use crate::core::config::TtlConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One TTL rule. `pattern` is a substring tested against the request path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlRule {
    pub pattern: String,

    #[serde(with = "humantime_serde")]
    pub success_ttl: Duration,

    #[serde(default, with = "humantime_serde::option")]
    pub failure_ttl: Option<Duration>,
}

/// Durations applicable to one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteTtl {
    /// TTL for successful (2xx) responses.
    pub success: Duration,

    /// Flat minimum TTL for negative (404) caching; `None` disables it.
    pub failure: Option<Duration>,
}

/// Ordered rule list with a global default.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    rules: Vec<TtlRule>,
    default_ttl: Duration,
}

impl TtlPolicy {
    pub fn new(rules: Vec<TtlRule>, default_ttl: Duration) -> Self {
        Self { rules, default_ttl }
    }

    /// Build the policy from loaded configuration.
    pub fn from_config(config: &TtlConfig) -> Self {
        let rules = config
            .rules
            .iter()
            .map(|rule| TtlRule {
                pattern: rule.pattern.clone(),
                success_ttl: rule.success_ttl,
                failure_ttl: rule.failure_ttl,
            })
            .collect();
        Self::new(rules, config.default_ttl)
    }

    /// Durations for the given request path: first matching rule wins,
    /// otherwise the default with negative caching disabled.
    pub fn ttl_for(&self, path: &str) -> RouteTtl {
        for rule in &self.rules {
            if path.contains(&rule.pattern) {
                return RouteTtl {
                    success: rule.success_ttl,
                    failure: rule.failure_ttl,
                };
            }
        }
        RouteTtl {
            success: self.default_ttl,
            failure: None,
        }
    }
}
