//! Mock threat-scanning API for local gateway runs.
//!
//! Emulates the three upstream endpoints with canned responses and an
//! optional rate-limit mode for exercising the client's retry path.
//!
//! # Environment Variables
//!
//! - `MOCK_SCAN_PORT`: Listen port (default: 9991)
//! - `MOCK_SCAN_DELAY_MS`: Response delay in milliseconds (default: 0)
//! - `MOCK_SCAN_429_EVERY`: Answer 429 to every Nth request (default: off)
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults
//! cargo run --bin mock_scan_api
//!
//! # Point the gateway at it
//! SCANGATE_API_URL=http://localhost:9991 SCANGATE_API_KEY=dev cargo run
//!
//! # Test with curl
//! curl -X POST http://localhost:9991/v1/results \
//!   -H "Content-Type: application/json" \
//!   -d '{"ids":["scan-1","scan-2"]}'
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::{Value, json};
use tokio::time::sleep;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

async fn maybe_throttle() -> Option<Response> {
    let delay_ms: u64 = std::env::var("MOCK_SCAN_DELAY_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    if delay_ms > 0 {
        sleep(Duration::from_millis(delay_ms)).await;
    }

    let every: u64 = std::env::var("MOCK_SCAN_429_EVERY")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    if every > 0 {
        let n = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
        if n % every == 0 {
            let body = json!({
                "message": "rate limit exceeded",
                "retry_after": { "interval": 1, "unit": "seconds" }
            });
            return Some((StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response());
        }
    }
    None
}

async fn handle_scan(Json(payload): Json<Value>) -> Response {
    if let Some(limited) = maybe_throttle().await {
        return limited;
    }
    let scan_id = format!("scan-{}", REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed));
    Json(json!({
        "scan_id": scan_id,
        "status": "queued",
        "echo": payload,
    }))
    .into_response()
}

async fn handle_results(Json(body): Json<Value>) -> Response {
    if let Some(limited) = maybe_throttle().await {
        return limited;
    }
    Json(json!({ "results": batch_items(&body, "clean") })).into_response()
}

async fn handle_reports(Json(body): Json<Value>) -> Response {
    if let Some(limited) = maybe_throttle().await {
        return limited;
    }
    Json(json!({ "results": batch_items(&body, "no threats found") })).into_response()
}

fn batch_items(body: &Value, verdict: &str) -> Value {
    let ids = body
        .get("ids")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    Value::Array(
        ids.into_iter()
            .map(|id| {
                json!({
                    "id": id,
                    "status": "complete",
                    "verdict": verdict,
                })
            })
            .collect(),
    )
}

#[tokio::main]
async fn main() {
    let port: u16 = std::env::var("MOCK_SCAN_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9991);

    let app = Router::new()
        .route("/v1/scan", post(handle_scan))
        .route("/v1/results", post(handle_results))
        .route("/v1/reports", post(handle_reports));

    let addr = format!("127.0.0.1:{port}");
    println!("mock scan API listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind mock listener");
    axum::serve(listener, app)
        .await
        .expect("mock server failed");
}
