//! Orchestration facade over the admission controller, response cache,
//! and resilient API client.
//!
//! One logical admission key per operation class (`scan`, `results`,
//! `reports`). Cacheable operations consult the cache before anything
//! else so a hit consumes no token; admission control always precedes a
//! network call. Batched fetches are cached only when every returned
//! item reports `"complete"` — partial batches would otherwise pin stale
//! verdicts for the full TTL.
//!
//! The facade is constructed once at the composition root and handed to
//! collaborators by reference; there is no global accessor.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::ScanGateError;
use crate::upstream::cache::{ResponseCache, batch_key, scan_key};
use crate::upstream::client::ScanApi;
use crate::upstream::limiter::RateLimiter;

/// Admission keys, one per upstream operation class.
const KEY_SCAN: &str = "scan";
const KEY_RESULTS: &str = "results";
const KEY_REPORTS: &str = "reports";

/// Facade composing admission control, caching, and the upstream client.
pub struct ScanService {
    api: Arc<dyn ScanApi>,
    cache: Arc<ResponseCache>,
    limiter: Arc<RateLimiter>,
}

impl ScanService {
    /// Compose a facade from its collaborators.
    pub fn new(api: Arc<dyn ScanApi>, cache: Arc<ResponseCache>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            api,
            cache,
            limiter,
        }
    }

    /// Submit content for scanning.
    ///
    /// Identical payloads fingerprint to the same cache key, so a repeat
    /// submission inside the TTL returns the original response without
    /// an upstream call.
    pub async fn submit_scan(&self, payload: &Value) -> Result<Value, ScanGateError> {
        let key = scan_key(KEY_SCAN, payload);
        if let Some(hit) = self.cache.get::<Value>(&key) {
            debug!(key = %key, "Scan cache hit");
            return Ok(hit);
        }
        self.limiter.await_acquire(KEY_SCAN).await;
        let response = self.api.submit_scan(payload).await?;
        self.cache.set(&key, &response, None);
        Ok(response)
    }

    /// Fetch verdicts for a batch of scan ids.
    ///
    /// The cache key is order-independent over the id list. The response
    /// is cached only when every item is complete.
    pub async fn get_results(&self, ids: &[String]) -> Result<Value, ScanGateError> {
        let key = batch_key(KEY_RESULTS, ids);
        if let Some(hit) = self.cache.get::<Value>(&key) {
            debug!(key = %key, "Results cache hit");
            return Ok(hit);
        }
        self.limiter.await_acquire(KEY_RESULTS).await;
        let response = self.api.fetch_results(ids).await?;
        if all_items_complete(&response) {
            self.cache.set(&key, &response, None);
        } else {
            debug!(key = %key, "Batch incomplete, not cached");
        }
        Ok(response)
    }

    /// Fetch full reports for a batch of scan ids. Same caching rules as
    /// [`Self::get_results`].
    pub async fn get_reports(&self, ids: &[String]) -> Result<Value, ScanGateError> {
        let key = batch_key(KEY_REPORTS, ids);
        if let Some(hit) = self.cache.get::<Value>(&key) {
            debug!(key = %key, "Reports cache hit");
            return Ok(hit);
        }
        self.limiter.await_acquire(KEY_REPORTS).await;
        let response = self.api.fetch_reports(ids).await?;
        if all_items_complete(&response) {
            self.cache.set(&key, &response, None);
        } else {
            debug!(key = %key, "Batch incomplete, not cached");
        }
        Ok(response)
    }
}

/// True when every item in the batch reports `"status": "complete"`.
///
/// A response whose shape is unexpected is treated as incomplete and
/// therefore never cached.
fn all_items_complete(response: &Value) -> bool {
    let Some(items) = response.get("results").and_then(Value::as_array) else {
        return false;
    };
    items
        .iter()
        .all(|item| item.get("status").and_then(Value::as_str) == Some("complete"))
}
