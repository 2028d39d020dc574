//! # Upstream Fetch Collaborator
//!
//! The seam between the orchestration layer and the raw HTTP transport.
//! A fetcher returns `(status, headers, body)` for *any* HTTP response it
//! manages to receive; only transport-level failures (DNS, connect,
//! timeout) surface as errors. Status interpretation belongs to the
//! orchestrator. No retries here: a single failed attempt surfaces as-is.

use crate::core::config::UpstreamConfig;
use crate::core::error::{ProxyError, ProxyResult};
use crate::core::types::UpstreamResponse;
use async_trait::async_trait;
use std::collections::HashMap;
use url::Url;

/// Trait for the upstream fetch collaborator.
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    /// Perform a GET against an absolute upstream URL.
    async fn fetch(&self, url: &str) -> ProxyResult<UpstreamResponse>;
}

/// Builds absolute upstream URLs from inbound path + parameters, appending
/// the configured API key. The key is added here and only here, so it never
/// leaks into cache keys derived from the inbound request.
#[derive(Debug, Clone)]
pub struct UpstreamUrlBuilder {
    base: Url,
    api_key: Option<String>,
}

impl UpstreamUrlBuilder {
    pub fn new(config: &UpstreamConfig) -> ProxyResult<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| ProxyError::internal(format!("Invalid upstream base URL: {}", e)))?;
        Ok(Self {
            base,
            api_key: config.api_key.clone(),
        })
    }

    /// Build the absolute URL for an inbound path and parameter set.
    /// Parameters are appended in sorted order so the produced URL is
    /// deterministic for logging and tests.
    pub fn build(&self, path: &str, params: &HashMap<String, String>) -> ProxyResult<String> {
        let mut url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|e| ProxyError::internal(format!("Invalid upstream path '{}': {}", path, e)))?;

        let mut sorted: Vec<(&String, &String)> = params.iter().collect();
        sorted.sort();

        if !sorted.is_empty() || self.api_key.is_some() {
            let mut query = url.query_pairs_mut();
            for (name, value) in sorted {
                query.append_pair(name, value);
            }
            if let Some(api_key) = &self.api_key {
                query.append_pair("api_key", api_key);
            }
        }

        Ok(url.into())
    }
}

/// Production fetcher backed by `reqwest`.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpstreamFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> ProxyResult<UpstreamResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProxyError::network(format!("Upstream request failed: {}", e)))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| ProxyError::network(format!("Failed to read upstream body: {}", e)))?
            .to_vec();

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
