//! Per-key token-bucket admission control.
//!
//! One bucket per admission key (one logical key per upstream operation
//! class). Buckets refill lazily on each check: elapsed time is converted
//! to whole refill windows and each whole window restores full capacity,
//! capped at capacity. `last_refill` advances only by whole windows, so
//! partial-window remainders carry over.
//!
//! Refill and consume happen under the map's entry guard, so each check
//! is atomic per key. No await occurs while a guard is held.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Floor for the idle-key purge threshold.
const MIN_STALE_AFTER: Duration = Duration::from_secs(60);

/// Longest single sleep inside [`RateLimiter::await_acquire`].
const MAX_WAIT_SLICE: Duration = Duration::from_secs(1);

/// Configuration for the admission controller.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Tokens restored per window (also the bucket capacity)
    pub max_requests: u32,
    /// Refill window length
    pub window: Duration,
    /// When false, every acquisition succeeds immediately
    pub enabled: bool,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window: Duration::from_secs(60),
            enabled: true,
        }
    }
}

impl RateLimiterConfig {
    /// Load configuration from environment variables.
    ///
    /// - `SCANGATE_RATE_LIMIT_MAX_REQUESTS` (default: 60)
    /// - `SCANGATE_RATE_LIMIT_WINDOW_MS` (default: 60000)
    /// - `SCANGATE_RATE_LIMIT_ENABLED` (default: true)
    ///
    /// Invalid values log a warning and fall back to the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SCANGATE_RATE_LIMIT_MAX_REQUESTS") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => config.max_requests = n,
                _ => {
                    warn!(
                        env_var = "SCANGATE_RATE_LIMIT_MAX_REQUESTS",
                        value = %val,
                        default = 60u32,
                        "Invalid value for environment variable, using default"
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("SCANGATE_RATE_LIMIT_WINDOW_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.window = Duration::from_millis(ms),
                _ => {
                    warn!(
                        env_var = "SCANGATE_RATE_LIMIT_WINDOW_MS",
                        value = %val,
                        default = 60000u64,
                        "Invalid value for environment variable, using default"
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("SCANGATE_RATE_LIMIT_ENABLED") {
            match val.parse::<bool>() {
                Ok(enabled) => config.enabled = enabled,
                Err(_) => {
                    warn!(
                        env_var = "SCANGATE_RATE_LIMIT_ENABLED",
                        value = %val,
                        "Invalid value for environment variable, using default"
                    );
                }
            }
        }

        config
    }
}

/// Point-in-time view of one bucket, as reported by [`RateLimiter::status`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RateLimitStatus {
    /// Tokens currently available
    pub available: u32,
    /// Bucket capacity
    pub limit: u32,
    /// When the next refill lands
    pub reset_at: DateTime<Utc>,
}

struct Bucket {
    tokens: u32,
    last_refill: Instant,
    last_seen: Instant,
}

impl Bucket {
    fn full(capacity: u32) -> Self {
        let now = Instant::now();
        Self {
            tokens: capacity,
            last_refill: now,
            last_seen: now,
        }
    }

    /// Apply lazy whole-window refill. `last_refill` only advances when a
    /// refill actually occurs.
    fn refill(&mut self, capacity: u32, window: Duration) {
        let elapsed = self.last_refill.elapsed();
        let windows = (elapsed.as_millis() / window.as_millis().max(1)) as u32;
        if windows > 0 {
            self.tokens = self
                .tokens
                .saturating_add(windows.saturating_mul(capacity))
                .min(capacity);
            self.last_refill += window * windows;
        }
    }
}

/// Per-key token-bucket admission controller.
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    /// Create an admission controller with the given configuration.
    pub fn new(config: RateLimiterConfig) -> Self {
        info!(
            max_requests = config.max_requests,
            window_ms = config.window.as_millis() as u64,
            enabled = config.enabled,
            "Admission controller configured"
        );
        Self {
            buckets: DashMap::new(),
            config,
        }
    }

    /// Try to take one token for `key`.
    ///
    /// Returns true and consumes a token if one is available after lazy
    /// refill; returns false without further mutation otherwise.
    pub fn try_acquire(&self, key: &str) -> bool {
        if !self.config.enabled {
            return true;
        }
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::full(self.config.max_requests));
        bucket.last_seen = Instant::now();
        bucket.refill(self.config.max_requests, self.config.window);
        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Suspend until a token for `key` is admitted.
    ///
    /// Loops on [`Self::try_acquire`], sleeping in bounded increments
    /// (at most one second) computed from the time to the next refill.
    pub async fn await_acquire(&self, key: &str) {
        loop {
            if self.try_acquire(key) {
                return;
            }
            let wait = self
                .time_to_next_refill(key)
                .unwrap_or(MAX_WAIT_SLICE)
                .min(MAX_WAIT_SLICE)
                .max(Duration::from_millis(10));
            debug!(key, wait_ms = wait.as_millis() as u64, "Admission denied, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    fn time_to_next_refill(&self, key: &str) -> Option<Duration> {
        let bucket = self.buckets.get(key)?;
        let next = bucket.last_refill + self.config.window;
        Some(next.saturating_duration_since(Instant::now()))
    }

    /// Point-in-time status for `key`.
    ///
    /// Reports a full, untouched bucket for keys never seen. Does not
    /// consume a token, but does apply lazy refill.
    pub fn status(&self, key: &str) -> RateLimitStatus {
        let limit = self.config.max_requests;
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::full(limit));
        bucket.refill(limit, self.config.window);
        let until_reset = (bucket.last_refill + self.config.window)
            .saturating_duration_since(Instant::now());
        RateLimitStatus {
            available: bucket.tokens,
            limit,
            reset_at: Utc::now()
                + chrono::Duration::from_std(until_reset)
                    .unwrap_or_else(|_| chrono::Duration::zero()),
        }
    }

    /// Restore `key` to a full bucket.
    pub fn reset(&self, key: &str) {
        self.buckets.remove(key);
    }

    /// Drop every bucket.
    pub fn clear(&self) {
        self.buckets.clear();
    }

    /// Number of tracked keys.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    /// Remove buckets idle for more than `max(2 × window, 60s)`.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_stale(&self) -> usize {
        let stale_after = (self.config.window * 2).max(MIN_STALE_AFTER);
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last_seen) <= stale_after);
        let removed = before - self.buckets.len();
        if removed > 0 {
            debug!(
                removed,
                remaining = self.buckets.len(),
                "Cleaned up stale admission buckets"
            );
        }
        removed
    }

    /// Spawn a background task that periodically purges idle keys.
    ///
    /// The task runs on the staleness interval and stops when the
    /// cancellation token is triggered.
    pub fn spawn_cleanup_task(self: &std::sync::Arc<Self>, shutdown: CancellationToken) {
        let limiter = std::sync::Arc::clone(self);
        let interval = (limiter.config.window * 2).max(MIN_STALE_AFTER);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await; // Skip immediate first tick
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        limiter.cleanup_stale();
                    }
                    _ = shutdown.cancelled() => {
                        debug!("Admission cleanup task shutting down");
                        break;
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(max_requests: u32, window_ms: u64) -> RateLimiterConfig {
        RateLimiterConfig {
            max_requests,
            window: Duration::from_millis(window_ms),
            enabled: true,
        }
    }

    #[test]
    fn test_admits_up_to_capacity_then_rejects() {
        let limiter = RateLimiter::new(test_config(2, 1000));
        assert!(limiter.try_acquire("default"));
        assert!(limiter.try_acquire("default"));
        assert!(!limiter.try_acquire("default"));
    }

    #[test]
    fn test_refills_after_window() {
        let limiter = RateLimiter::new(test_config(2, 50));
        assert!(limiter.try_acquire("default"));
        assert!(limiter.try_acquire("default"));
        assert!(!limiter.try_acquire("default"));
        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.try_acquire("default"));
    }

    #[test]
    fn test_refill_caps_at_capacity() {
        let limiter = RateLimiter::new(test_config(3, 10));
        assert!(limiter.try_acquire("k"));
        // Many windows elapse; tokens must cap at capacity, not accumulate.
        std::thread::sleep(Duration::from_millis(100));
        for _ in 0..3 {
            assert!(limiter.try_acquire("k"));
        }
        assert!(!limiter.try_acquire("k"));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(test_config(1, 60_000));
        assert!(limiter.try_acquire("scan"));
        assert!(!limiter.try_acquire("scan"));
        assert!(limiter.try_acquire("results"));
    }

    #[test]
    fn test_rejection_does_not_mutate_tokens() {
        let limiter = RateLimiter::new(test_config(1, 60_000));
        assert!(limiter.try_acquire("k"));
        assert!(!limiter.try_acquire("k"));
        assert!(!limiter.try_acquire("k"));
        let status = limiter.status("k");
        assert_eq!(status.available, 0);
        assert_eq!(status.limit, 1);
    }

    #[test]
    fn test_status_for_unseen_key_reports_full_bucket() {
        let limiter = RateLimiter::new(test_config(5, 60_000));
        let status = limiter.status("fresh");
        assert_eq!(status.available, 5);
        assert_eq!(status.limit, 5);
        assert!(status.reset_at > Utc::now());
    }

    #[test]
    fn test_reset_restores_full_bucket() {
        let limiter = RateLimiter::new(test_config(1, 60_000));
        assert!(limiter.try_acquire("k"));
        assert!(!limiter.try_acquire("k"));
        limiter.reset("k");
        assert!(limiter.try_acquire("k"));
    }

    #[test]
    fn test_clear_drops_every_bucket() {
        let limiter = RateLimiter::new(test_config(1, 60_000));
        limiter.try_acquire("a");
        limiter.try_acquire("b");
        assert_eq!(limiter.tracked_keys(), 2);
        limiter.clear();
        assert_eq!(limiter.tracked_keys(), 0);
        assert!(limiter.try_acquire("a"));
    }

    #[test]
    fn test_disabled_limiter_always_admits() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            enabled: false,
            ..test_config(1, 60_000)
        });
        for _ in 0..100 {
            assert!(limiter.try_acquire("k"));
        }
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_cleanup_removes_idle_keys() {
        // window 5ms -> stale_after floors at 60s, so nothing is stale yet.
        let limiter = RateLimiter::new(test_config(1, 5));
        limiter.try_acquire("k");
        assert_eq!(limiter.cleanup_stale(), 0);
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn test_await_acquire_suspends_until_refill() {
        let limiter = RateLimiter::new(test_config(1, 100));
        assert!(limiter.try_acquire("k"));
        let start = Instant::now();
        limiter.await_acquire("k").await;
        // Must have waited for the next refill window rather than spinning
        // through immediately.
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_await_acquire_immediate_when_tokens_available() {
        let limiter = RateLimiter::new(test_config(2, 60_000));
        let start = Instant::now();
        limiter.await_acquire("k").await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
