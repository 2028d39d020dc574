//! # Enrichment Memoizer
//!
//! Report bodies are run through a slow, expensive extraction call (an LLM
//! behind the [`Extractor`] trait) to produce a structured annotation. The
//! memoizer guarantees the cost is paid at most once per distinct body:
//! results are cached under a content hash of the raw text, so the same
//! report appearing in overlapping date-range queries, or re-fetched after
//! feed-cache expiry, reuses the stored extraction.
//!
//! Batches fan out concurrently and each item fails in isolation: one bad
//! extraction leaves that item unenriched and the rest of the batch intact.
//! Two concurrent misses on the same body may both compute; both arrive at
//! the same content-addressed entry, so the only cost is the duplicated
//! call.

pub mod salvage;

use crate::caching::stores::CacheStore;
use crate::core::types::ReportItem;
use async_trait::async_trait;
use futures::future::join_all;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Versioned key prefix; bump the version to invalidate every stored
/// extraction when the prompt or output contract changes.
const KEY_PREFIX: &str = "enrich:v1:";

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Extraction backend error: {message}")]
    Backend { message: String },

    #[error("Extraction produced no usable output")]
    Empty,
}

impl ExtractionError {
    pub fn backend<S: Into<String>>(message: S) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// The slow extraction call. Implementations return the model's raw textual
/// output; interpreting it (including salvaging near-JSON) is the
/// memoizer's job.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, raw_text: &str) -> Result<String, ExtractionError>;
}

/// Content-addressed cache key for a report body. Identical text always
/// yields the identical key, regardless of which response it arrived in.
pub fn enrichment_key(raw_text: &str) -> String {
    let digest = Sha256::digest(raw_text.as_bytes());
    format!("{}{}", KEY_PREFIX, hex::encode(digest))
}

/// Memoizing wrapper around an [`Extractor`].
pub struct EnrichmentMemoizer {
    store: Arc<dyn CacheStore>,
    extractor: Arc<dyn Extractor>,
    ttl: Duration,
}

impl EnrichmentMemoizer {
    pub fn new(store: Arc<dyn CacheStore>, extractor: Arc<dyn Extractor>, ttl: Duration) -> Self {
        Self {
            store,
            extractor,
            ttl,
        }
    }

    /// Enrich every eligible item in the batch, concurrently. Items that are
    /// not reports (or have empty bodies) are skipped; items whose
    /// extraction fails are left unenriched.
    pub async fn enrich(&self, items: &mut [ReportItem]) {
        let tasks = items
            .iter_mut()
            .filter(|item| item.is_enrichable())
            .map(|item| self.enrich_item(item));
        join_all(tasks).await;
    }

    /// Enrich one item: cached result if available, otherwise extract,
    /// salvage, and store. Never fails the caller.
    async fn enrich_item(&self, item: &mut ReportItem) {
        let key = enrichment_key(&item.raw_body);

        match self.store.get(&key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    debug!(key = %key, "Enrichment cache hit");
                    item.enrichment = Some(value);
                    return;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Undecodable enrichment entry, recomputing");
                }
            },
            Ok(None) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "Enrichment cache read failed, recomputing");
            }
        }

        let raw_output = match self.extractor.extract(&item.raw_body).await {
            Ok(output) => output,
            Err(e) => {
                warn!(key = %key, error = %e, "Extraction failed, item left unenriched");
                return;
            }
        };

        let Some(value) = salvage::structured_from_text(&raw_output) else {
            warn!(key = %key, "Extraction returned empty output, item left unenriched");
            return;
        };

        match serde_json::to_vec(&value) {
            Ok(bytes) => {
                if let Err(e) = self.store.set(&key, &bytes, self.ttl).await {
                    warn!(key = %key, error = %e, "Enrichment cache write failed");
                }
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize enrichment");
            }
        }
        item.enrichment = Some(value);
    }
}
