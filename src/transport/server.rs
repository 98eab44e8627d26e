//! HTTP transport: a single endpoint speaking JSON-RPC over POST and
//! content-negotiated GET (event stream or server info).
//!
//! # Request Flow
//!
//! 1. Body size is capped at the HTTP layer before buffering
//! 2. A semaphore permit is acquired (or the gateway answers 503)
//! 3. The JSON-RPC envelope is parsed and validated
//! 4. The protocol router dispatches the method
//! 5. The reply goes out synchronously, or over the caller's event
//!    stream when streaming was negotiated and policy opts in
//!
//! A GET with `Accept: text/event-stream` resolves (or mints) a session,
//! opens that client's event channel, and echoes the session id in the
//! `Mcp-Session-Id` response header.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::error::ScanGateError;
use crate::transport::jsonrpc::{RpcId, RpcResponse, parse_request};
use crate::transport::router::{Delivery, PROTOCOL_VERSION, ProtocolRouter};
use crate::transport::session::SessionManager;
use crate::transport::sse::SseBroadcaster;

/// Session header, sent by clients and echoed when a stream is opened.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Configuration for the HTTP layer.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:8080")
    pub listen_addr: String,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    /// Maximum concurrently processed requests
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            max_body_size: 1024 * 1024, // 1MB
            max_concurrent_requests: 10000,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// - `SCANGATE_LISTEN` (default: "0.0.0.0:8080")
    /// - `SCANGATE_MAX_REQUEST_BODY_BYTES` (default: 1048576)
    /// - `SCANGATE_MAX_CONCURRENT_REQUESTS` (default: 10000)
    pub fn from_env() -> Self {
        let listen_addr =
            std::env::var("SCANGATE_LISTEN").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let max_body_size: usize = std::env::var("SCANGATE_MAX_REQUEST_BODY_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1024 * 1024);

        let max_concurrent_requests: usize = std::env::var("SCANGATE_MAX_CONCURRENT_REQUESTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10000);

        Self {
            listen_addr,
            max_body_size,
            max_concurrent_requests,
        }
    }
}

/// Shared state behind every HTTP handler.
pub struct GatewayState {
    pub router: ProtocolRouter,
    pub sessions: Arc<SessionManager>,
    pub broadcaster: Arc<SseBroadcaster>,
    pub semaphore: Arc<Semaphore>,
    pub started_at: Instant,
    max_body_size: usize,
}

impl GatewayState {
    pub fn new(
        router: ProtocolRouter,
        sessions: Arc<SessionManager>,
        broadcaster: Arc<SseBroadcaster>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            router,
            sessions,
            broadcaster,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_requests)),
            started_at: Instant::now(),
            max_body_size: config.max_body_size,
        }
    }
}

/// Build the axum router.
///
/// `POST /messages` is the same handler as `POST /`; it exists for
/// clients that follow the `endpoint` handshake frame.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    let max_body = state.max_body_size;
    Router::new()
        .route("/", get(handle_get).post(handle_post))
        .route("/messages", post(handle_post))
        .route("/healthz", get(handle_health))
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(state)
}

async fn handle_post(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Concurrency gate; held for the duration of the request.
    let _permit = match state.semaphore.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            let err = ScanGateError::ServiceUnavailable {
                reason: "request capacity exhausted".to_string(),
            };
            return rpc_error_response(None, &err);
        }
    };

    let request = match parse_request(&body) {
        Ok(req) => req,
        Err(e) => return rpc_error_response(None, &e),
    };

    // POST never mints a session; only the event-stream GET does.
    let session = session_header(&headers).and_then(|id| state.sessions.get(id));
    let streaming_negotiated = session
        .as_ref()
        .map(|s| state.broadcaster.is_open(&s.client_id))
        .unwrap_or(false);

    match state
        .router
        .handle(request, streaming_negotiated, session.as_ref())
        .await
    {
        Delivery::Respond(response) => json_response(StatusCode::OK, &response),
        Delivery::Streamed => StatusCode::ACCEPTED.into_response(),
        Delivery::Accepted => StatusCode::ACCEPTED.into_response(),
    }
}

async fn handle_get(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    if !wants_event_stream(&headers) {
        return server_info(&state);
    }

    let session = state.sessions.resolve(session_header(&headers));
    let rx = state.broadcaster.open(&session.client_id);
    info!(
        session_id = %session.session_id,
        client_id = %session.client_id,
        "Event stream established"
    );

    let stream =
        ReceiverStream::new(rx).map(|frame| Ok::<Bytes, Infallible>(Bytes::from(frame.to_wire())));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(SESSION_HEADER, session.session_id.as_str())
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn handle_health(State(state): State<Arc<GatewayState>>) -> Response {
    let body = json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    });
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Static server-info document for plain GETs.
fn server_info(state: &GatewayState) -> Response {
    let body = json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "protocolVersion": PROTOCOL_VERSION,
        "transport": {
            "post": "/",
            "eventStream": { "accept": "text/event-stream" }
        },
        "sessions": state.sessions.count(),
    });
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("text/event-stream"))
        .unwrap_or(false)
}

fn json_response(status: StatusCode, response: &RpcResponse) -> Response {
    let bytes = serde_json::to_vec(response).unwrap_or_default();
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        bytes,
    )
        .into_response()
}

/// Well-formed JSON-RPC error body with the HTTP status the error calls
/// for. Used before a request id is known; serializes `"id": null`.
fn rpc_error_response(id: Option<RpcId>, err: &ScanGateError) -> Response {
    debug!(kind = err.kind(), "Rejecting request");
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json_response(status, &RpcResponse::error(id, err.to_jsonrpc_error()))
}
