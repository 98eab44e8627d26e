//! Error handling for ScanGate.
//!
//! This module defines all error types that can occur in the gateway and
//! provides JSON-RPC 2.0 compliant error response formatting.
//!
//! ## Module Organization
//!
//! - `jsonrpc` - JSON-RPC 2.0 error response structures
//! - `ScanGateError` - the gateway error taxonomy
//!
//! ## Error taxonomy
//!
//! Every failure carries a kind discriminator (the enum variant) plus the
//! structured fields callers branch on, rather than opaque exception
//! classes:
//!
//! | Variant | Retried | Wire code |
//! |---------|---------|-----------|
//! | `InvalidRequest` | never | -32600 |
//! | `MethodNotFound` | never | -32603 |
//! | `Validation` | never | -32603 |
//! | `UpstreamStatus` | never | -32603 |
//! | `RateLimited` | yes, honoring the retry-after hint | -32603 |
//! | `Transport` / `Timeout` | yes, exponential backoff | -32603 |
//! | `Serialization` | never | -32603 |
//! | `ServiceUnavailable` | never | -32603 |
//! | `Internal` | never | -32603 |

pub mod jsonrpc;

pub use jsonrpc::{ErrorData, JsonRpcError};

use thiserror::Error;

/// All error types that can occur in ScanGate.
///
/// Only two JSON-RPC codes ever reach the wire: `-32600` for malformed
/// envelopes and `-32603` for everything else. Unknown methods are
/// deliberately reported as `-32603` rather than `-32601`; deployed
/// clients key on that code and the change would break them.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScanGateError {
    /// Request is not a valid JSON-RPC 2.0 message.
    #[error("Invalid JSON-RPC request: {details}")]
    InvalidRequest {
        /// Description of what makes the request invalid
        details: String,
    },

    /// The requested method has no handler.
    #[error("Method '{method}' not found")]
    MethodNotFound {
        /// The method name that was not found
        method: String,
    },

    /// Client-side validation failed before any network call was made.
    #[error("Validation failed: {details}")]
    Validation {
        /// Description of the validation failure
        details: String,
    },

    /// The scan API returned a terminal non-2xx status.
    #[error("Scan API returned status {status}: {message}")]
    UpstreamStatus {
        /// The upstream HTTP status code
        status: u16,
        /// The upstream error message
        message: String,
    },

    /// The scan API rejected the call with "too many requests" and
    /// retries were exhausted.
    #[error("Scan API rate limit exceeded")]
    RateLimited {
        /// Last retry-after hint from the upstream, in milliseconds
        retry_after_ms: Option<u64>,
    },

    /// Transport-level failure reaching the scan API.
    #[error("Cannot reach scan API: {reason}")]
    Transport {
        /// Reason for the connection failure
        reason: String,
    },

    /// The scan API did not respond in time.
    #[error("Scan API did not respond within {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed, in milliseconds
        timeout_ms: u64,
    },

    /// The upstream body could not be parsed as JSON. Reported with
    /// status 0 since no meaningful HTTP status applies.
    #[error("Unparsable scan API response: {details}")]
    Serialization {
        /// Description of the parse failure
        details: String,
    },

    /// The gateway is at capacity.
    #[error("Service temporarily unavailable: {reason}")]
    ServiceUnavailable {
        /// Reason for unavailability
        reason: String,
    },

    /// Internal gateway error.
    #[error("Internal error: {details}")]
    Internal {
        /// Description for the logs; never echoed to callers
        details: String,
    },
}

impl ScanGateError {
    /// Maps the error to its JSON-RPC 2.0 error code.
    ///
    /// `-32602`/`-32601` are reserved but never produced.
    pub fn jsonrpc_code(&self) -> i32 {
        match self {
            Self::InvalidRequest { .. } => -32600,
            _ => -32603,
        }
    }

    /// Returns the error kind name for logging and the wire `data.kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::MethodNotFound { .. } => "method_not_found",
            Self::Validation { .. } => "validation",
            Self::UpstreamStatus { .. } => "upstream_status",
            Self::RateLimited { .. } => "rate_limited",
            Self::Transport { .. } => "transport",
            Self::Timeout { .. } => "timeout",
            Self::Serialization { .. } => "serialization",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal",
        }
    }

    /// The upstream HTTP status associated with this error, if any.
    ///
    /// Serialization failures report status 0 (no meaningful status).
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::UpstreamStatus { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::Serialization { .. } => Some(0),
            _ => None,
        }
    }

    /// Returns the retry-after hint for retriable errors, in milliseconds.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms } => *retry_after_ms,
            _ => None,
        }
    }

    /// Returns safe details for client consumption.
    ///
    /// Validation failures are client-caused, so their description is
    /// returned verbatim. Upstream messages and internal details stay in
    /// the logs.
    fn safe_details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation { details } => Some(serde_json::json!({ "reason": details })),
            Self::Timeout { timeout_ms } => Some(serde_json::json!({ "timeout_ms": timeout_ms })),
            _ => None,
        }
    }

    /// Converts the error to a JSON-RPC error object.
    ///
    /// Messages are fixed, sanitized strings: `"Invalid Request"` for
    /// protocol errors, `"Internal error"` for everything else. Structured
    /// context travels in `data`.
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        let code = self.jsonrpc_code();
        let message = match code {
            -32600 => "Invalid Request",
            _ => "Internal error",
        };
        JsonRpcError {
            code,
            message: message.to_string(),
            data: Some(ErrorData {
                kind: self.kind().to_string(),
                status: self.upstream_status(),
                details: self.safe_details(),
                retry_after_ms: self.retry_after_ms(),
            }),
        }
    }

    /// HTTP status for the enclosing response.
    ///
    /// Malformed envelopes get a 4xx; capacity exhaustion gets 503; all
    /// other failures still produce a well-formed JSON-RPC error body
    /// under HTTP 200.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest { .. } => 400,
            Self::ServiceUnavailable { .. } => 503,
            _ => 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            ScanGateError::InvalidRequest {
                details: "no method".to_string()
            }
            .jsonrpc_code(),
            -32600
        );
        // Everything else collapses onto -32603, including unknown methods.
        assert_eq!(
            ScanGateError::MethodNotFound {
                method: "nope".to_string()
            }
            .jsonrpc_code(),
            -32603
        );
        assert_eq!(
            ScanGateError::UpstreamStatus {
                status: 502,
                message: "bad gateway".to_string()
            }
            .jsonrpc_code(),
            -32603
        );
        assert_eq!(
            ScanGateError::Validation {
                details: "empty id list".to_string()
            }
            .jsonrpc_code(),
            -32603
        );
    }

    #[test]
    fn test_wire_messages_are_sanitized() {
        let err = ScanGateError::UpstreamStatus {
            status: 500,
            message: "stack trace with internals".to_string(),
        };
        let wire = err.to_jsonrpc_error();
        assert_eq!(wire.message, "Internal error");
        assert_eq!(wire.data.as_ref().unwrap().status, Some(500));
        // The upstream message must not leak into the wire object.
        let json = serde_json::to_string(&wire).unwrap();
        assert!(!json.contains("stack trace"));
    }

    #[test]
    fn test_unknown_method_wire_shape() {
        let wire = ScanGateError::MethodNotFound {
            method: "nope".to_string(),
        }
        .to_jsonrpc_error();
        assert_eq!(wire.code, -32603);
        assert_eq!(wire.message, "Internal error");
        assert_eq!(wire.data.unwrap().kind, "method_not_found");
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            ScanGateError::InvalidRequest {
                details: "x".to_string()
            }
            .http_status(),
            400
        );
        assert_eq!(
            ScanGateError::ServiceUnavailable {
                reason: "at capacity".to_string()
            }
            .http_status(),
            503
        );
        assert_eq!(
            ScanGateError::MethodNotFound {
                method: "x".to_string()
            }
            .http_status(),
            200
        );
    }

    #[test]
    fn test_serialization_reports_status_zero() {
        let err = ScanGateError::Serialization {
            details: "not json".to_string(),
        };
        assert_eq!(err.upstream_status(), Some(0));
    }

    #[test]
    fn test_rate_limited_carries_hint() {
        let err = ScanGateError::RateLimited {
            retry_after_ms: Some(2000),
        };
        let wire = err.to_jsonrpc_error();
        assert_eq!(wire.data.unwrap().retry_after_ms, Some(2000));
    }
}
