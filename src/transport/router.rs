//! Protocol method routing.
//!
//! Routes validated JSON-RPC requests to their handlers:
//!
//! | Method | Handled by |
//! |--------|------------|
//! | `initialize` | internal (static protocol metadata) |
//! | `ping` | internal (liveness) |
//! | `notifications/initialized` | internal (no-op) |
//! | `resources/templates/list` | internal (resource catalog templates) |
//! | `completion/complete` | internal (empty completion) |
//! | `tools/list`, `tools/call` | tool catalog |
//! | `resources/list`, `resources/read` | resource catalog |
//! | `prompts/list`, `prompts/get` | prompt catalog |
//! | anything else | routing error |
//!
//! Unknown methods surface on the wire as `-32603` / `"Internal error"`,
//! not `-32601`; deployed clients branch on that shape.
//!
//! Streaming eligibility is evaluated per call behind the
//! [`StreamPolicy`] strategy: a method must be on the candidate
//! allow-list, the caller must have negotiated event-stream delivery,
//! and the policy must opt in. The base policy never opts in, so the
//! hook is inert until a deployment swaps the policy.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::catalog::{PromptCatalog, ResourceCatalog, ToolCatalog};
use crate::error::ScanGateError;
use crate::transport::jsonrpc::{RpcRequest, RpcResponse};
use crate::transport::session::{Session, SessionManager};
use crate::transport::sse::SseBroadcaster;

/// Protocol version advertised by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Methods that may ever be delivered over the event stream. Only
/// long-running, large-result methods qualify for candidacy.
pub const STREAM_CANDIDATES: &[&str] = &["tools/call", "resources/read"];

/// Strategy deciding whether an eligible method's response should go
/// over the event stream instead of the synchronous reply.
pub trait StreamPolicy: Send + Sync {
    fn should_stream(&self, method: &str) -> bool;
}

/// Base policy: nothing streams. Kept as a strategy object so enabling
/// streaming for a method is a policy swap, not a router change.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverStream;

impl StreamPolicy for NeverStream {
    fn should_stream(&self, _method: &str) -> bool {
        false
    }
}

/// How the router delivered (or declined to deliver) a response.
#[derive(Debug)]
pub enum Delivery {
    /// Reply synchronously with this response.
    Respond(RpcResponse),
    /// The response was handed to the event-stream broadcaster.
    Streamed,
    /// Notification: processed, no reply.
    Accepted,
}

/// Router over the protocol's method surface.
pub struct ProtocolRouter {
    tools: ToolCatalog,
    resources: ResourceCatalog,
    prompts: PromptCatalog,
    sessions: Arc<SessionManager>,
    broadcaster: Arc<SseBroadcaster>,
    stream_policy: Arc<dyn StreamPolicy>,
}

impl ProtocolRouter {
    pub fn new(
        tools: ToolCatalog,
        resources: ResourceCatalog,
        prompts: PromptCatalog,
        sessions: Arc<SessionManager>,
        broadcaster: Arc<SseBroadcaster>,
        stream_policy: Arc<dyn StreamPolicy>,
    ) -> Self {
        Self {
            tools,
            resources,
            prompts,
            sessions,
            broadcaster,
            stream_policy,
        }
    }

    /// Handle a validated request and decide the delivery path.
    ///
    /// `streaming_negotiated` is true when the caller holds a session
    /// with an open event stream. `session` is the caller's resolved
    /// session, if any; asking to stream without one mints a session as
    /// a side effect.
    pub async fn handle(
        &self,
        request: RpcRequest,
        streaming_negotiated: bool,
        session: Option<&Session>,
    ) -> Delivery {
        if request.is_notification() {
            // Notifications get no reply; failures are logged only.
            if let Err(e) = self.dispatch(&request).await {
                debug!(method = %request.method, kind = e.kind(), "Notification handler failed");
            }
            return Delivery::Accepted;
        }

        let id = request.id.clone();
        let method = request.method.clone();
        let response = match self.dispatch(&request).await {
            Ok(result) => RpcResponse::success(id, result),
            Err(e) => {
                warn!(method = %method, kind = e.kind(), error = %e, "Request failed");
                RpcResponse::error(id, e.to_jsonrpc_error())
            }
        };

        if streaming_negotiated && self.wants_stream(&method) {
            let session = match session {
                Some(s) => s.clone(),
                // Being asked to stream without a session mints one.
                None => self.sessions.resolve(None),
            };
            if self.broadcaster.send_response(&session.client_id, &response) {
                return Delivery::Streamed;
            }
            // Channel gone between negotiation and delivery; fall back to
            // the synchronous reply.
        }

        Delivery::Respond(response)
    }

    fn wants_stream(&self, method: &str) -> bool {
        STREAM_CANDIDATES.contains(&method) && self.stream_policy.should_stream(method)
    }

    /// Dispatch by exact method-name match.
    async fn dispatch(&self, request: &RpcRequest) -> Result<Value, ScanGateError> {
        let params = request.params.as_ref();
        match request.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {},
                    "resources": {},
                    "prompts": {}
                },
                "serverInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION")
                }
            })),
            "ping" => Ok(json!({})),
            "notifications/initialized" => Ok(json!({})),
            "resources/templates/list" => Ok(self.resources.templates()),
            "completion/complete" => Ok(json!({
                "completion": { "values": [], "total": 0, "hasMore": false }
            })),
            "tools/list" => Ok(self.tools.list()),
            "tools/call" => {
                let name = params
                    .and_then(|p| p.get("name"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| ScanGateError::Validation {
                        details: "tools/call requires a 'name' parameter".to_string(),
                    })?;
                let arguments = params.and_then(|p| p.get("arguments"));
                self.tools.call(name, arguments).await
            }
            "resources/list" => Ok(self.resources.list()),
            "resources/read" => {
                let uri = params
                    .and_then(|p| p.get("uri"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| ScanGateError::Validation {
                        details: "resources/read requires a 'uri' parameter".to_string(),
                    })?;
                self.resources.read(uri)
            }
            "prompts/list" => Ok(self.prompts.list()),
            "prompts/get" => {
                let name = params
                    .and_then(|p| p.get("name"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| ScanGateError::Validation {
                        details: "prompts/get requires a 'name' parameter".to_string(),
                    })?;
                let arguments = params.and_then(|p| p.get("arguments"));
                self.prompts.get(name, arguments)
            }
            unknown => Err(ScanGateError::MethodNotFound {
                method: unknown.to_string(),
            }),
        }
    }
}
