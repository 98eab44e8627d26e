//! JSON-RPC 2.0 types and parsing.
//!
//! # JSON-RPC 2.0 Compliance
//!
//! - Requests have `id`, `method`, and optional `params`
//! - A request whose `id` is absent or `null` is a notification
//! - `id` type (string or integer) MUST be preserved in responses
//!
//! # Security Note
//!
//! This module parses untrusted input. All parsing is done with size limits
//! enforced at the HTTP layer (see server.rs).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::borrow::Cow;

use crate::error::{JsonRpcError, ScanGateError};

/// JSON-RPC 2.0 version constant.
const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC request/response ID.
///
/// Per JSON-RPC 2.0 the id is a string, a number, or null. The original
/// type must round-trip unchanged into the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    /// Numeric id
    Number(i64),
    /// String id
    String(String),
    /// Explicit null id
    Null,
}

/// Distinguishes "id absent" from "id: null" during deserialization, so
/// both can be treated as notifications without conflating them with a
/// failed parse.
fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<RpcId>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(Some(RpcId::Null));
    }
    RpcId::deserialize(value)
        .map(Some)
        .map_err(serde::de::Error::custom)
}

/// Raw JSON-RPC 2.0 request as received from the client.
///
/// All fields are optional to allow for proper error reporting on
/// malformed requests; validation happens in [`parse_request`].
#[derive(Debug, Clone, Deserialize)]
struct RawRpcRequest {
    /// Must be "2.0"
    jsonrpc: Option<String>,
    /// Request ID (absent for notifications, Some(Null) for explicit null)
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    id: Option<RpcId>,
    /// Method name
    method: Option<String>,
    /// Method parameters
    params: Option<Value>,
}

/// Validated JSON-RPC 2.0 request.
#[derive(Clone, Serialize)]
pub struct RpcRequest {
    /// Always "2.0"
    pub jsonrpc: Cow<'static, str>,
    /// Request ID (None or Null for notifications)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RpcId>,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Params may carry scan payloads; keep them out of Debug output.
impl std::fmt::Debug for RpcRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcRequest")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("params", &self.params.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RpcRequest {
    /// Returns true if this is a notification (no reply expected).
    ///
    /// An absent id and an explicit `"id": null` both denote a
    /// notification.
    #[inline]
    pub fn is_notification(&self) -> bool {
        matches!(self.id, None | Some(RpcId::Null))
    }
}

/// JSON-RPC 2.0 response.
///
/// # ID Serialization
///
/// Per JSON-RPC 2.0 the `id` field is REQUIRED in responses and MUST be
/// the same as the request's `id`, or `null` if the request id could not
/// be determined (e.g. parse error). The field always serializes; `None`
/// becomes `"id": null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Always "2.0"
    pub jsonrpc: Cow<'static, str>,
    /// Request ID - always serialized (None becomes null)
    pub id: Option<RpcId>,
    /// Result (mutually exclusive with error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (mutually exclusive with result)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl RpcResponse {
    /// Create a success response echoing the request id.
    pub fn success(id: Option<RpcId>, result: Value) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response echoing the request id.
    ///
    /// Pass `None` if the request id could not be determined; this
    /// serializes as `"id": null`.
    pub fn error(id: Option<RpcId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Parse and validate a JSON-RPC request body.
///
/// # Errors
///
/// Returns `InvalidRequest` when the body is not JSON, the `jsonrpc`
/// field is not `"2.0"`, or `method` is missing or empty. Unknown methods
/// are NOT rejected here; routing decides what to do with them.
pub fn parse_request(body: &[u8]) -> Result<RpcRequest, ScanGateError> {
    let raw: RawRpcRequest =
        serde_json::from_slice(body).map_err(|e| ScanGateError::InvalidRequest {
            details: format!("request body is not a JSON-RPC object: {e}"),
        })?;

    match raw.jsonrpc.as_deref() {
        Some(JSONRPC_VERSION) => {}
        Some(other) => {
            return Err(ScanGateError::InvalidRequest {
                details: format!("unsupported jsonrpc version '{other}'"),
            });
        }
        None => {
            return Err(ScanGateError::InvalidRequest {
                details: "missing jsonrpc version field".to_string(),
            });
        }
    }

    let method = match raw.method {
        Some(m) if !m.is_empty() => m,
        _ => {
            return Err(ScanGateError::InvalidRequest {
                details: "missing method".to_string(),
            });
        }
    };

    Ok(RpcRequest {
        jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
        id: raw.id,
        method,
        params: raw.params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_valid_request() {
        let body = br#"{"jsonrpc":"2.0","method":"ping","id":1}"#;
        let req = parse_request(body).unwrap();
        assert_eq!(req.method, "ping");
        assert_eq!(req.id, Some(RpcId::Number(1)));
        assert!(!req.is_notification());
    }

    #[test]
    fn test_parse_string_id() {
        let body = br#"{"jsonrpc":"2.0","method":"ping","id":"abc"}"#;
        let req = parse_request(body).unwrap();
        assert_eq!(req.id, Some(RpcId::String("abc".to_string())));
    }

    #[test]
    fn test_missing_method_is_invalid_request() {
        let body = br#"{"jsonrpc":"2.0","id":1}"#;
        let err = parse_request(body).unwrap_err();
        assert_eq!(err.jsonrpc_code(), -32600);
    }

    #[test]
    fn test_missing_version_is_invalid_request() {
        let body = br#"{"method":"ping","id":1}"#;
        let err = parse_request(body).unwrap_err();
        assert_eq!(err.jsonrpc_code(), -32600);
    }

    #[test]
    fn test_garbage_body_is_invalid_request() {
        let err = parse_request(b"not json at all").unwrap_err();
        assert_eq!(err.jsonrpc_code(), -32600);
    }

    #[test]
    fn test_null_id_is_notification() {
        let body = br#"{"jsonrpc":"2.0","method":"notifications/initialized","id":null}"#;
        let req = parse_request(body).unwrap();
        assert_eq!(req.id, Some(RpcId::Null));
        assert!(req.is_notification());
    }

    #[test]
    fn test_absent_id_is_notification() {
        let body = br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        let req = parse_request(body).unwrap();
        assert!(req.id.is_none());
        assert!(req.is_notification());
    }

    #[test]
    fn test_response_echoes_request_id() {
        let resp = RpcResponse::success(Some(RpcId::Number(7)), json!({"ok": true}));
        let wire = serde_json::to_value(&resp).unwrap();
        assert_eq!(wire["jsonrpc"], "2.0");
        assert_eq!(wire["id"], 7);
        assert_eq!(wire["result"]["ok"], true);
        assert!(wire.get("error").is_none());
    }

    #[test]
    fn test_error_response_with_unknown_id_serializes_null() {
        let resp = RpcResponse::error(
            None,
            JsonRpcError {
                code: -32600,
                message: "Invalid Request".to_string(),
                data: None,
            },
        );
        let wire = serde_json::to_value(&resp).unwrap();
        assert!(wire["id"].is_null());
        assert_eq!(wire["error"]["code"], -32600);
    }

    #[test]
    fn test_debug_redacts_params() {
        let req = RpcRequest {
            jsonrpc: Cow::Borrowed("2.0"),
            id: Some(RpcId::Number(1)),
            method: "tools/call".to_string(),
            params: Some(json!({"secret": "payload"})),
        };
        let debug = format!("{req:?}");
        assert!(!debug.contains("payload"));
    }
}
