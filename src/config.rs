//! Gateway configuration.
//!
//! Each component owns its config struct and env-var loader; this module
//! composes them into the single `GatewayConfig` consumed by the
//! composition root.
//!
//! # Environment Variables
//!
//! | Variable | Default |
//! |----------|---------|
//! | `SCANGATE_LISTEN` | `0.0.0.0:8080` |
//! | `SCANGATE_MAX_REQUEST_BODY_BYTES` | `1048576` |
//! | `SCANGATE_MAX_CONCURRENT_REQUESTS` | `10000` |
//! | `SCANGATE_API_URL` | required |
//! | `SCANGATE_API_KEY` | required |
//! | `SCANGATE_REQUEST_TIMEOUT_SECS` | `30` |
//! | `SCANGATE_MAX_RETRIES` | `3` |
//! | `SCANGATE_RETRY_BASE_DELAY_MS` | `500` |
//! | `SCANGATE_CACHE_TTL_SECS` | `300` |
//! | `SCANGATE_CACHE_MAX_BYTES` | `52428800` |
//! | `SCANGATE_CACHE_ENABLED` | `true` |
//! | `SCANGATE_RATE_LIMIT_MAX_REQUESTS` | `60` |
//! | `SCANGATE_RATE_LIMIT_WINDOW_MS` | `60000` |
//! | `SCANGATE_RATE_LIMIT_ENABLED` | `true` |

use crate::error::ScanGateError;
use crate::transport::server::ServerConfig;
use crate::upstream::{CacheConfig, RateLimiterConfig, UpstreamConfig};

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimiterConfig,
}

impl GatewayConfig {
    /// Load the full configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when a required upstream variable is missing or
    /// malformed. Component tunables with defaults never fail; invalid
    /// values are logged and defaulted.
    pub fn from_env() -> Result<Self, ScanGateError> {
        Ok(Self {
            server: ServerConfig::from_env(),
            upstream: UpstreamConfig::from_env()?,
            cache: CacheConfig::from_env(),
            rate_limit: RateLimiterConfig::from_env(),
        })
    }
}
