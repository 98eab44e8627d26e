//! Resource catalog: gateway introspection documents.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::error::ScanGateError;
use crate::upstream::{RateLimiter, ResponseCache};

const URI_CACHE_STATS: &str = "scan://stats/cache";
const URI_RATE_LIMIT_STATS: &str = "scan://stats/rate-limit";

/// Resources exposed over `resources/list` and `resources/read`.
pub struct ResourceCatalog {
    cache: Arc<ResponseCache>,
    limiter: Arc<RateLimiter>,
}

impl ResourceCatalog {
    pub fn new(cache: Arc<ResponseCache>, limiter: Arc<RateLimiter>) -> Self {
        Self { cache, limiter }
    }

    /// Static resource definitions.
    pub fn list(&self) -> Value {
        json!({
            "resources": [
                {
                    "uri": URI_CACHE_STATS,
                    "name": "Response cache statistics",
                    "mimeType": "application/json"
                },
                {
                    "uri": URI_RATE_LIMIT_STATS,
                    "name": "Admission controller status",
                    "mimeType": "application/json"
                }
            ]
        })
    }

    /// Static resource templates (`resources/templates/list`).
    pub fn templates(&self) -> Value {
        json!({
            "resourceTemplates": [
                {
                    "uriTemplate": "scan://stats/{component}",
                    "name": "Gateway component statistics",
                    "mimeType": "application/json"
                }
            ]
        })
    }

    /// Read one resource by uri.
    pub fn read(&self, uri: &str) -> Result<Value, ScanGateError> {
        let text = match uri {
            URI_CACHE_STATS => serde_json::to_string(&self.cache.stats()).map_err(|e| {
                ScanGateError::Internal {
                    details: format!("failed to serialize cache stats: {e}"),
                }
            })?,
            URI_RATE_LIMIT_STATS => {
                let status = json!({
                    "scan": self.limiter.status("scan"),
                    "results": self.limiter.status("results"),
                    "reports": self.limiter.status("reports"),
                });
                status.to_string()
            }
            other => {
                return Err(ScanGateError::Validation {
                    details: format!("unknown resource '{other}'"),
                });
            }
        };

        Ok(json!({
            "contents": [{
                "uri": uri,
                "mimeType": "application/json",
                "text": text
            }]
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{CacheConfig, RateLimiterConfig};

    fn catalog() -> ResourceCatalog {
        ResourceCatalog::new(
            Arc::new(ResponseCache::new(CacheConfig::default())),
            Arc::new(RateLimiter::new(RateLimiterConfig::default())),
        )
    }

    #[test]
    fn test_list_and_templates_are_static() {
        let catalog = catalog();
        assert_eq!(catalog.list()["resources"].as_array().unwrap().len(), 2);
        assert_eq!(
            catalog.templates()["resourceTemplates"][0]["uriTemplate"],
            "scan://stats/{component}"
        );
    }

    #[test]
    fn test_read_cache_stats() {
        let result = catalog().read(URI_CACHE_STATS).unwrap();
        let text = result["contents"][0]["text"].as_str().unwrap();
        let stats: Value = serde_json::from_str(text).unwrap();
        assert_eq!(stats["count"], 0);
        assert_eq!(stats["enabled"], true);
    }

    #[test]
    fn test_read_rate_limit_status_covers_operation_classes() {
        let result = catalog().read(URI_RATE_LIMIT_STATS).unwrap();
        let text = result["contents"][0]["text"].as_str().unwrap();
        let status: Value = serde_json::from_str(text).unwrap();
        for key in ["scan", "results", "reports"] {
            assert!(status[key]["available"].is_number(), "missing {key}");
        }
    }

    #[test]
    fn test_read_unknown_uri_is_a_validation_error() {
        let err = catalog().read("scan://nope").unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}
