//! Shared helpers for the integration suite: gateway construction and an
//! in-process mock scan API.
#![allow(dead_code)] // Each integration binary uses a subset of these.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde_json::{Value, json};

use scangate::catalog::{PromptCatalog, ResourceCatalog, ToolCatalog};
use scangate::transport::server::{GatewayState, ServerConfig, build_router};
use scangate::transport::{NeverStream, ProtocolRouter, SessionManager, SseBroadcaster};
use scangate::upstream::{
    CacheConfig, RateLimiter, RateLimiterConfig, ResponseCache, ScanApiClient, ScanService,
    UpstreamConfig,
};

/// Build a gateway router wired to the given upstream base URL.
///
/// Returns the axum app plus the shared state for assertions on
/// sessions and channels.
pub fn gateway(base_url: &str) -> (axum::Router, Arc<GatewayState>) {
    let cache = Arc::new(ResponseCache::new(CacheConfig::default()));
    let limiter = Arc::new(RateLimiter::new(RateLimiterConfig::default()));
    let client = ScanApiClient::new(UpstreamConfig::with_base_url(base_url, "test-key")).unwrap();
    let service = Arc::new(ScanService::new(
        Arc::new(client),
        cache.clone(),
        limiter.clone(),
    ));
    let sessions = Arc::new(SessionManager::new());
    let broadcaster = Arc::new(SseBroadcaster::new());
    let router = ProtocolRouter::new(
        ToolCatalog::new(service),
        ResourceCatalog::new(cache, limiter),
        PromptCatalog::new(),
        sessions.clone(),
        broadcaster.clone(),
        Arc::new(NeverStream),
    );
    let state = Arc::new(GatewayState::new(
        router,
        sessions,
        broadcaster,
        &ServerConfig::default(),
    ));
    (build_router(state.clone()), state)
}

/// How the mock upstream answers.
#[derive(Debug, Clone)]
pub enum MockMode {
    /// 200 with complete batch items / a scan receipt.
    Ok,
    /// 429 (with an optional retry-after body) for the first `limited`
    /// requests, then 200.
    RateLimitedThenOk {
        limited: usize,
        retry_after: Option<Value>,
    },
    /// Always the given terminal status with a JSON error body.
    AlwaysStatus(u16),
    /// 200 with a body that is not JSON.
    Garbage,
}

/// Handle to a running in-process mock scan API.
pub struct MockUpstream {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
}

impl MockUpstream {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct MockState {
    mode: MockMode,
    hits: Arc<AtomicUsize>,
}

/// Spawn the mock on an ephemeral port.
pub async fn spawn_mock(mode: MockMode) -> MockUpstream {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = MockState {
        mode,
        hits: hits.clone(),
    };

    let app = axum::Router::new()
        .route("/v1/scan", post(handle_any))
        .route("/v1/results", post(handle_any))
        .route("/v1/reports", post(handle_any))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockUpstream {
        base_url: format!("http://{addr}"),
        hits,
    }
}

async fn handle_any(
    axum::extract::State(state): axum::extract::State<MockState>,
    axum::extract::Json(body): axum::extract::Json<Value>,
) -> Response {
    let hit = state.hits.fetch_add(1, Ordering::SeqCst);

    match &state.mode {
        MockMode::Ok => ok_response(&body),
        MockMode::RateLimitedThenOk {
            limited,
            retry_after,
        } => {
            if hit < *limited {
                let mut payload = json!({"message": "rate limit exceeded"});
                if let Some(hint) = retry_after {
                    payload["retry_after"] = hint.clone();
                }
                (StatusCode::TOO_MANY_REQUESTS, payload.to_string()).into_response()
            } else {
                ok_response(&body)
            }
        }
        MockMode::AlwaysStatus(status) => (
            StatusCode::from_u16(*status).unwrap(),
            json!({"message": "upstream exploded"}).to_string(),
        )
            .into_response(),
        MockMode::Garbage => (StatusCode::OK, "definitely not json").into_response(),
    }
}

fn ok_response(body: &Value) -> Response {
    // Batched calls carry an id list; scan submissions do not.
    match body.get("ids").and_then(Value::as_array) {
        Some(ids) => {
            let items: Vec<Value> = ids
                .iter()
                .map(|id| json!({"id": id, "status": "complete", "verdict": "clean"}))
                .collect();
            axum::Json(json!({ "results": items })).into_response()
        }
        None => axum::Json(json!({"scan_id": "scan-1", "status": "queued"})).into_response(),
    }
}
