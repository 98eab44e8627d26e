//! Server-sent event framing and per-client broadcast channels.
//!
//! The broadcaster owns one outbound channel per connected client id,
//! created when the HTTP layer opens an event stream and removed on
//! disconnect or write failure. Frame serialization is byte-exact:
//! stream-consuming clients parse the `id:`/`event:`/`data:`/`retry:`
//! line grammar directly.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;

use crate::transport::jsonrpc::RpcResponse;

/// Outbound channel capacity per client. A consumer that falls this far
/// behind is treated as gone.
const CHANNEL_CAPACITY: usize = 256;

/// A single server-sent event frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseFrame {
    /// Optional event id (`id: <n>` line)
    pub id: Option<u64>,
    /// Optional event name (`event: <name>` line)
    pub event: Option<String>,
    /// Payload; internal newlines become one `data:` line each
    pub data: String,
    /// Optional client reconnect delay (`retry: <ms>` line)
    pub retry_ms: Option<u64>,
}

impl SseFrame {
    /// A frame with just an event name and payload.
    pub fn event(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(name.into()),
            data: data.into(),
            ..Self::default()
        }
    }

    /// Serialize to the wire format.
    ///
    /// Each non-empty field becomes one line; the `data` payload is split
    /// on newlines with every line prefixed `data: `; a blank line
    /// terminates the frame. This exact byte sequence is what clients
    /// interoperate against; do not reorder the fields.
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        if let Some(id) = self.id {
            out.push_str("id: ");
            out.push_str(&id.to_string());
            out.push('\n');
        }
        if let Some(event) = &self.event {
            out.push_str("event: ");
            out.push_str(event);
            out.push('\n');
        }
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        if let Some(retry) = self.retry_ms {
            out.push_str("retry: ");
            out.push_str(&retry.to_string());
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

/// Registry of open event-stream channels, one per client id.
#[derive(Debug, Default)]
pub struct SseBroadcaster {
    channels: DashMap<String, mpsc::Sender<SseFrame>>,
    next_message_id: AtomicU64,
}

impl SseBroadcaster {
    /// Create an empty broadcaster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a channel for `client_id` and return its receiving end.
    ///
    /// Emits the handshake: a `connect` frame with `{"connected":true}`
    /// followed by an `endpoint` frame with `{"endpoint":"/messages"}`.
    /// The endpoint frame is kept for older clients that POST follow-up
    /// messages to a separate path. Re-opening an existing client id
    /// replaces its previous channel.
    pub fn open(&self, client_id: &str) -> mpsc::Receiver<SseFrame> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        // Handshake frames are queued before the sender is published, so
        // they are always first on the stream.
        let connect = SseFrame::event("connect", json!({"connected": true}).to_string());
        let endpoint = SseFrame::event("endpoint", json!({"endpoint": "/messages"}).to_string());
        let _ = tx.try_send(connect);
        let _ = tx.try_send(endpoint);

        self.channels.insert(client_id.to_string(), tx);
        debug!(client_id, open = self.channels.len(), "Event stream opened");
        rx
    }

    /// Send a frame to one client.
    ///
    /// Returns `false` without error when the client id is unknown. A
    /// failed write (consumer gone or hopelessly behind) drops the
    /// client's channel; it is not re-created automatically.
    pub fn send(&self, client_id: &str, frame: SseFrame) -> bool {
        let Some(tx) = self.channels.get(client_id).map(|e| e.value().clone()) else {
            return false;
        };
        if tx.try_send(frame).is_err() {
            self.channels.remove(client_id);
            debug!(client_id, "Dropped event stream after failed write");
            return false;
        }
        true
    }

    /// Send a frame to every connected client.
    pub fn broadcast(&self, frame: SseFrame) {
        let clients: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        for client_id in clients {
            self.send(&client_id, frame.clone());
        }
    }

    /// Deliver a JSON-RPC response over the stream.
    ///
    /// The response is wrapped as an `event: message` frame with an
    /// auto-incrementing per-broadcaster message id.
    pub fn send_response(&self, client_id: &str, response: &RpcResponse) -> bool {
        let data = match serde_json::to_string(response) {
            Ok(s) => s,
            Err(_) => return false,
        };
        let frame = SseFrame {
            id: Some(self.next_message_id.fetch_add(1, Ordering::Relaxed)),
            event: Some("message".to_string()),
            data,
            retry_ms: None,
        };
        self.send(client_id, frame)
    }

    /// Deliver a server-initiated notification frame to every client.
    pub fn notify_all(&self, payload: &serde_json::Value) {
        self.broadcast(SseFrame::event("notification", payload.to_string()));
    }

    /// Whether `client_id` has an open channel.
    pub fn is_open(&self, client_id: &str) -> bool {
        self.channels.contains_key(client_id)
    }

    /// Drop one client's channel.
    pub fn close(&self, client_id: &str) {
        self.channels.remove(client_id);
    }

    /// Drop every channel (used during shutdown).
    pub fn close_all(&self) {
        self.channels.clear();
    }

    /// Number of open channels.
    pub fn open_count(&self) -> usize {
        self.channels.len()
    }
}
