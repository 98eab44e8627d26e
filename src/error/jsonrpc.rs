//! JSON-RPC 2.0 error response structures.
//!
//! This structure is embedded in JSON-RPC error responses and follows
//! the JSON-RPC 2.0 specification. The `data` payload is sanitized:
//! upstream bodies are never echoed to callers, only the upstream HTTP
//! status and a machine-readable kind discriminator.

use serde::{Deserialize, Serialize};

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code (standard JSON-RPC range)
    pub code: i32,

    /// Human-readable error message
    pub message: String,

    /// Additional error data (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ErrorData>,
}

/// Additional error context data.
///
/// All fields are safe for client consumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    /// Machine-readable error kind name
    pub kind: String,

    /// Upstream HTTP status, when the failure originated upstream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Kind-specific details (sanitized)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Suggested retry delay in milliseconds (for retriable errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}
