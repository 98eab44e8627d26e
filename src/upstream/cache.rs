//! TTL- and size-bounded response cache.
//!
//! Entries are keyed by a fingerprint of the request (operation kind plus
//! serialized payload) so identical calls short-circuit the upstream.
//! Expiry is checked lazily on read and proactively by a background
//! sweep. Under size pressure, insertion evicts entries soonest-expiry
//! first until the aggregate drops to 90% of the configured maximum; the
//! hysteresis keeps a full cache from thrashing at the boundary.
//!
//! All mutating state (entry map plus aggregate size counter) sits behind
//! one mutex so the size invariant holds across read-modify-write
//! sequences on a multi-threaded runtime. No suspension point occurs
//! while the lock is held.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for the response cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Default entry lifetime
    pub ttl: Duration,
    /// Maximum aggregate estimated size in bytes
    pub max_size: u64,
    /// When false, `get` always misses and `set` is a no-op
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_size: 50 * 1024 * 1024, // 50MB
            enabled: true,
        }
    }
}

impl CacheConfig {
    /// Load configuration from environment variables.
    ///
    /// - `SCANGATE_CACHE_TTL_SECS` (default: 300)
    /// - `SCANGATE_CACHE_MAX_BYTES` (default: 52428800)
    /// - `SCANGATE_CACHE_ENABLED` (default: true)
    ///
    /// Invalid values log a warning and fall back to the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SCANGATE_CACHE_TTL_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.ttl = Duration::from_secs(secs),
                _ => {
                    warn!(
                        env_var = "SCANGATE_CACHE_TTL_SECS",
                        value = %val,
                        default = 300u64,
                        "Invalid value for environment variable, using default"
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("SCANGATE_CACHE_MAX_BYTES") {
            match val.parse::<u64>() {
                Ok(bytes) if bytes > 0 => config.max_size = bytes,
                _ => {
                    warn!(
                        env_var = "SCANGATE_CACHE_MAX_BYTES",
                        value = %val,
                        "Invalid value for environment variable, using default"
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("SCANGATE_CACHE_ENABLED") {
            match val.parse::<bool>() {
                Ok(enabled) => config.enabled = enabled,
                Err(_) => {
                    warn!(
                        env_var = "SCANGATE_CACHE_ENABLED",
                        value = %val,
                        "Invalid value for environment variable, using default"
                    );
                }
            }
        }

        config
    }
}

/// Cache usage counters reported by [`ResponseCache::stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Aggregate estimated size of live entries, in bytes
    pub size: u64,
    /// Number of live entries
    pub count: usize,
    /// Whether the cache is enabled
    pub enabled: bool,
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
    size: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    total_size: u64,
}

impl CacheInner {
    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.total_size -= entry.size;
                true
            }
            None => false,
        }
    }

    /// Evict soonest-expiry-first until `incoming` more bytes would fit
    /// under `floor`.
    fn evict_for(&mut self, incoming: u64, floor: u64) {
        while self.total_size + incoming > floor && !self.entries.is_empty() {
            let victim = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone());
            match victim {
                Some(key) => {
                    self.remove(&key);
                }
                None => break,
            }
        }
    }
}

/// Response cache shared by the orchestration facade and the resource
/// catalog.
pub struct ResponseCache {
    inner: Mutex<CacheInner>,
    config: CacheConfig,
}

impl ResponseCache {
    /// Create a cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        info!(
            ttl_secs = config.ttl.as_secs(),
            max_bytes = config.max_size,
            enabled = config.enabled,
            "Response cache configured"
        );
        Self {
            inner: Mutex::new(CacheInner::default()),
            config,
        }
    }

    /// Look up a value, deserializing into `T`.
    ///
    /// An expired entry is deleted and treated as a miss at read time.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.config.enabled {
            return None;
        }
        let mut inner = self.inner.lock();
        let expired = match inner.entries.get(key) {
            Some(entry) if entry.expires_at <= Instant::now() => true,
            Some(entry) => {
                return serde_json::from_value(entry.value.clone()).ok();
            }
            None => return None,
        };
        if expired {
            inner.remove(key);
        }
        None
    }

    /// Insert a value under `key`.
    ///
    /// The entry size is estimated as twice the serialized byte length to
    /// approximate wide-character encoding. If admitting the entry would
    /// push the aggregate past the configured maximum, entries are
    /// evicted soonest-expiry-first until the aggregate (including the
    /// new entry) is at most 90% of the maximum. An entry that cannot fit
    /// under that floor on its own is not inserted.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl_override: Option<Duration>) {
        if !self.config.enabled {
            return;
        }
        let serialized = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Refusing to cache unserializable value");
                return;
            }
        };
        let size = serialized.len() as u64 * 2;
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(_) => return,
        };
        let ttl = ttl_override.unwrap_or(self.config.ttl);
        let floor = self.config.max_size * 9 / 10;

        let mut inner = self.inner.lock();
        inner.remove(key);
        if inner.total_size + size > self.config.max_size {
            inner.evict_for(size, floor);
            if inner.total_size + size > floor {
                // Even an empty cache cannot admit this entry under the
                // eviction floor; inserting it would defeat the bound.
                debug!(key, size, floor, "Entry too large to cache");
                return;
            }
        }
        inner.total_size += size;
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
                size,
            },
        );
    }

    /// Remove one entry. Returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        self.inner.lock().remove(key)
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.total_size = 0;
    }

    /// Current usage counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            size: inner.total_size,
            count: inner.entries.len(),
            enabled: self.config.enabled,
        }
    }

    /// Remove all currently-expired entries. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        if !expired.is_empty() {
            debug!(
                removed = expired.len(),
                remaining = inner.entries.len(),
                "Swept expired cache entries"
            );
        }
        expired.len()
    }

    /// Spawn a background task that proactively removes expired entries.
    ///
    /// The sweep interval is `min(ttl, 60s)`; the task stops when the
    /// cancellation token is triggered.
    pub fn spawn_sweep_task(self: &std::sync::Arc<Self>, shutdown: CancellationToken) {
        let cache = std::sync::Arc::clone(self);
        let interval = cache.config.ttl.min(Duration::from_secs(60));
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await; // Skip immediate first tick
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        cache.sweep_expired();
                    }
                    _ = shutdown.cancelled() => {
                        debug!("Cache sweep task shutting down");
                        break;
                    }
                }
            }
        });
    }
}

/// Fingerprint for a scan-class operation: a deterministic digest of the
/// operation kind and the serialized payload. serde_json sorts object
/// keys, so semantically identical payloads fingerprint identically.
pub fn scan_key(kind: &str, payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0x1f]);
    hasher.update(payload.to_string().as_bytes());
    let digest = hasher.finalize();
    hex_prefix(&digest)
}

/// Fingerprint for a batched lookup: the kind plus the sorted id list, so
/// id order does not defeat cache hits.
pub fn batch_key(kind: &str, ids: &[String]) -> String {
    let mut sorted: Vec<&str> = ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0x1f]);
    hasher.update(sorted.join(",").as_bytes());
    let digest = hasher.finalize();
    hex_prefix(&digest)
}

fn hex_prefix(digest: &[u8]) -> String {
    digest.iter().take(16).map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_config(max_size: u64, ttl: Duration) -> CacheConfig {
        CacheConfig {
            ttl,
            max_size,
            enabled: true,
        }
    }

    fn cache_with(max_size: u64) -> ResponseCache {
        ResponseCache::new(test_config(max_size, Duration::from_secs(60)))
    }

    #[test]
    fn test_set_then_get() {
        let cache = cache_with(1024 * 1024);
        cache.set("k", &json!({"v": 1}), None);
        let hit: Option<Value> = cache.get("k");
        assert_eq!(hit, Some(json!({"v": 1})));
        assert_eq!(cache.stats().count, 1);
    }

    #[test]
    fn test_ttl_expiry_is_lazy() {
        let cache = cache_with(1024 * 1024);
        cache.set("k", &json!("v"), Some(Duration::from_millis(20)));
        assert_eq!(cache.get::<Value>("k"), Some(json!("v")));
        std::thread::sleep(Duration::from_millis(30));
        // Expired entry is removed by the read itself.
        assert_eq!(cache.get::<Value>("k"), None);
        assert_eq!(cache.stats().count, 0);
    }

    #[test]
    fn test_eviction_keeps_size_under_ninety_percent() {
        // Each entry: serialized ~102 bytes -> estimated ~204.
        let cache = cache_with(1000);
        let payload = json!({"data": "x".repeat(90)});
        for i in 0..10 {
            cache.set(&format!("k{i}"), &payload, None);
        }
        let stats = cache.stats();
        assert!(stats.size <= 900, "size {} exceeds 0.9*max", stats.size);
        assert!(stats.count < 10);
    }

    #[test]
    fn test_eviction_removes_soonest_expiry_first() {
        let cache = cache_with(1000);
        let payload = json!({"data": "x".repeat(140)});
        cache.set("soon", &payload, Some(Duration::from_secs(5)));
        cache.set("later", &payload, Some(Duration::from_secs(500)));
        cache.set("latest", &payload, Some(Duration::from_secs(5000)));
        // The fourth insert must push the aggregate over max and evict
        // the entry closest to expiry.
        cache.set("new", &payload, Some(Duration::from_secs(50)));
        assert_eq!(cache.get::<Value>("soon"), None);
        assert!(cache.get::<Value>("latest").is_some());
    }

    #[test]
    fn test_oversized_entry_is_not_inserted() {
        let cache = cache_with(100);
        cache.set("big", &json!({"data": "x".repeat(500)}), None);
        assert_eq!(cache.stats().count, 0);
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn test_overwrite_replaces_size_accounting() {
        let cache = cache_with(1024 * 1024);
        cache.set("k", &json!({"data": "x".repeat(100)}), None);
        let first = cache.stats().size;
        cache.set("k", &json!({"data": "y"}), None);
        assert!(cache.stats().size < first);
        assert_eq!(cache.stats().count, 1);
    }

    #[test]
    fn test_delete_and_clear() {
        let cache = cache_with(1024 * 1024);
        cache.set("a", &json!(1), None);
        cache.set("b", &json!(2), None);
        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        cache.clear();
        let stats = cache.stats();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.size, 0);
    }

    #[test]
    fn test_disabled_cache_misses_and_ignores_set() {
        let cache = ResponseCache::new(CacheConfig {
            enabled: false,
            ..test_config(1024, Duration::from_secs(60))
        });
        cache.set("k", &json!(1), None);
        assert_eq!(cache.get::<Value>("k"), None);
        let stats = cache.stats();
        assert_eq!(stats.count, 0);
        assert!(!stats.enabled);
    }

    #[test]
    fn test_sweep_removes_expired_entries() {
        let cache = cache_with(1024 * 1024);
        cache.set("old", &json!(1), Some(Duration::from_millis(10)));
        cache.set("new", &json!(2), Some(Duration::from_secs(60)));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.stats().count, 1);
    }

    #[test]
    fn test_batch_key_is_order_independent() {
        let a = batch_key("results", &["b".to_string(), "a".to_string()]);
        let b = batch_key("results", &["a".to_string(), "b".to_string()]);
        assert_eq!(a, b);
        // Different kinds must not collide.
        let c = batch_key("reports", &["a".to_string(), "b".to_string()]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_scan_key_is_deterministic() {
        let payload = json!({"url": "https://example.com", "depth": 2});
        assert_eq!(scan_key("scan", &payload), scan_key("scan", &payload));
        assert_ne!(
            scan_key("scan", &payload),
            scan_key("scan", &json!({"url": "https://example.org"}))
        );
    }
}
