//! Resilient HTTP client for the upstream threat-scanning API.
//!
//! Every call attaches the fixed auth and content headers and enforces a
//! per-request timeout. Transient failures are retried with exponential
//! backoff; a 429 honours the server-supplied retry-after hint when the
//! body carries one. Terminal upstream statuses are translated into
//! structured errors without echoing the upstream body to callers.
//!
//! # Error Classification
//!
//! - Timeout / abort → `Timeout`, retried
//! - Connection failure → `Transport`, retried
//! - 429 → retried with hint or backoff; `RateLimited` once exhausted
//! - Other non-2xx → `UpstreamStatus`, terminal
//! - Unparsable success body → `Serialization`, terminal

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::ScanGateError;

/// Maximum number of ids accepted by the batched endpoints.
pub const MAX_BATCH_IDS: usize = 50;

/// Configuration for the upstream client.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the scan API (e.g., "https://scan.example.com")
    pub base_url: String,
    /// Bearer token attached to every call
    pub api_key: String,
    /// Per-request timeout (includes connection + response)
    pub timeout: Duration,
    /// Retry attempts after the initial call
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub retry_base_delay: Duration,
    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            pool_max_idle_per_host: 32,
        }
    }
}

impl UpstreamConfig {
    /// Load configuration from environment variables.
    ///
    /// - `SCANGATE_API_URL` (required): base URL of the scan API
    /// - `SCANGATE_API_KEY` (required): bearer token
    /// - `SCANGATE_REQUEST_TIMEOUT_SECS` (default: 30)
    /// - `SCANGATE_MAX_RETRIES` (default: 3)
    /// - `SCANGATE_RETRY_BASE_DELAY_MS` (default: 500)
    ///
    /// # Errors
    ///
    /// Returns `Validation` if a required variable is missing or a
    /// numeric variable does not parse.
    pub fn from_env() -> Result<Self, ScanGateError> {
        let base_url = std::env::var("SCANGATE_API_URL").map_err(|_| ScanGateError::Validation {
            details: "SCANGATE_API_URL environment variable is required".to_string(),
        })?;
        let api_key = std::env::var("SCANGATE_API_KEY").map_err(|_| ScanGateError::Validation {
            details: "SCANGATE_API_KEY environment variable is required".to_string(),
        })?;

        let timeout_secs: u64 = match std::env::var("SCANGATE_REQUEST_TIMEOUT_SECS") {
            Ok(val) => val.parse().map_err(|_| ScanGateError::Validation {
                details: format!(
                    "SCANGATE_REQUEST_TIMEOUT_SECS must be a valid integer, got: '{val}'"
                ),
            })?,
            Err(_) => 30,
        };

        let max_retries: u32 = match std::env::var("SCANGATE_MAX_RETRIES") {
            Ok(val) => val.parse().map_err(|_| ScanGateError::Validation {
                details: format!("SCANGATE_MAX_RETRIES must be a valid integer, got: '{val}'"),
            })?,
            Err(_) => 3,
        };

        let retry_base_delay_ms: u64 = match std::env::var("SCANGATE_RETRY_BASE_DELAY_MS") {
            Ok(val) => val.parse().map_err(|_| ScanGateError::Validation {
                details: format!(
                    "SCANGATE_RETRY_BASE_DELAY_MS must be a valid integer, got: '{val}'"
                ),
            })?,
            Err(_) => 500,
        };

        Ok(Self {
            base_url,
            api_key,
            timeout: Duration::from_secs(timeout_secs),
            max_retries,
            retry_base_delay: Duration::from_millis(retry_base_delay_ms),
            ..Default::default()
        })
    }

    /// Create a config with the specified base URL and key, using default
    /// values for everything else.
    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }
}

/// The upstream operations the orchestration facade depends on.
///
/// The seam exists so facade and catalog tests can substitute a stub
/// without a network listener.
#[async_trait]
pub trait ScanApi: Send + Sync {
    /// Submit content for scanning.
    async fn submit_scan(&self, payload: &Value) -> Result<Value, ScanGateError>;
    /// Fetch verdicts for a batch of scan ids.
    async fn fetch_results(&self, ids: &[String]) -> Result<Value, ScanGateError>;
    /// Fetch full reports for a batch of scan ids.
    async fn fetch_reports(&self, ids: &[String]) -> Result<Value, ScanGateError>;
}

/// Resilient scan API client.
///
/// `Clone` is cheap; the underlying reqwest client pools connections
/// internally.
#[derive(Clone)]
pub struct ScanApiClient {
    client: Client,
    config: UpstreamConfig,
}

impl ScanApiClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the underlying HTTP client cannot be built.
    pub fn new(config: UpstreamConfig) -> Result<Self, ScanGateError> {
        let client = Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .map_err(|e| ScanGateError::Transport {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, config })
    }

    /// Issue one request with retry, backoff, and error translation.
    ///
    /// Retries apply to transport failures and 429 responses only; any
    /// other non-2xx is terminal on first occurrence.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ScanGateError> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut attempt: u32 = 0;

        loop {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .header(AUTHORIZATION, format!("Bearer {}", self.config.api_key))
                .header(CONTENT_TYPE, "application/json")
                .header(ACCEPT, "application/json")
                .timeout(self.config.timeout);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    let error = classify_transport_error(&e, self.config.timeout);
                    if attempt < self.config.max_retries {
                        let delay = self.backoff_delay(attempt);
                        warn!(
                            path,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Transport failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(error);
                }
            };

            let status = response.status();
            if status.is_success() {
                return response
                    .json::<Value>()
                    .await
                    .map_err(|e| ScanGateError::Serialization {
                        details: format!("upstream body is not valid JSON: {e}"),
                    });
            }

            // Read the error body once; used for the retry-after hint and
            // the sanitized upstream message.
            let body_text = response.text().await.unwrap_or_default();
            let body_json: Option<Value> = serde_json::from_str(&body_text).ok();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let hint_ms = body_json.as_ref().and_then(parse_retry_after_ms);
                if attempt < self.config.max_retries {
                    let delay = hint_ms
                        .map(Duration::from_millis)
                        .unwrap_or_else(|| self.backoff_delay(attempt));
                    warn!(
                        path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        hinted = hint_ms.is_some(),
                        "Scan API rate limit, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                return Err(ScanGateError::RateLimited {
                    retry_after_ms: hint_ms,
                });
            }

            let message = body_json
                .as_ref()
                .and_then(|b| b.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("upstream error")
                .to_string();
            debug!(path, status = status.as_u16(), "Terminal upstream status");
            return Err(ScanGateError::UpstreamStatus {
                status: status.as_u16(),
                message,
            });
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.config.retry_base_delay * 2u32.saturating_pow(attempt)
    }

    fn validate_batch(ids: &[String]) -> Result<(), ScanGateError> {
        if ids.is_empty() {
            return Err(ScanGateError::Validation {
                details: "id list must not be empty".to_string(),
            });
        }
        if ids.len() > MAX_BATCH_IDS {
            return Err(ScanGateError::Validation {
                details: format!("id list exceeds maximum of {MAX_BATCH_IDS}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ScanApi for ScanApiClient {
    async fn submit_scan(&self, payload: &Value) -> Result<Value, ScanGateError> {
        self.send(Method::POST, "/v1/scan", Some(payload)).await
    }

    async fn fetch_results(&self, ids: &[String]) -> Result<Value, ScanGateError> {
        Self::validate_batch(ids)?;
        self.send(Method::POST, "/v1/results", Some(&json!({ "ids": ids })))
            .await
    }

    async fn fetch_reports(&self, ids: &[String]) -> Result<Value, ScanGateError> {
        Self::validate_batch(ids)?;
        self.send(Method::POST, "/v1/reports", Some(&json!({ "ids": ids })))
            .await
    }
}

fn classify_transport_error(e: &reqwest::Error, timeout: Duration) -> ScanGateError {
    if e.is_timeout() {
        ScanGateError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        ScanGateError::Transport {
            reason: e.to_string(),
        }
    }
}

/// Extract a retry-after hint from an upstream 429 body and convert its
/// stated unit to milliseconds.
///
/// Expected shape: `{"retry_after": {"interval": 2, "unit": "seconds"}}`.
fn parse_retry_after_ms(body: &Value) -> Option<u64> {
    let hint = body.get("retry_after")?;
    let interval = hint.get("interval")?.as_u64()?;
    let unit = hint.get("unit").and_then(Value::as_str).unwrap_or("seconds");
    let ms = match unit {
        "milliseconds" => interval,
        "seconds" => interval * 1_000,
        "minutes" => interval * 60_000,
        "hours" => interval * 3_600_000,
        _ => return None,
    };
    Some(ms)
}
