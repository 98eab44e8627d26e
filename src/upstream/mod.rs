//! The resilient client side of the gateway: admission control, response
//! caching, the retrying HTTP client, and the facade that composes them.

pub mod cache;
pub mod client;
pub mod facade;
pub mod limiter;

pub use cache::{CacheConfig, CacheStats, ResponseCache};
pub use client::{MAX_BATCH_IDS, ScanApi, ScanApiClient, UpstreamConfig};
pub use facade::ScanService;
pub use limiter::{RateLimitStatus, RateLimiter, RateLimiterConfig};
