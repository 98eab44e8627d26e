//! Per-client session tracking for the event-stream layer.
//!
//! A session binds the opaque `Mcp-Session-Id` header value to a stable
//! per-connection client identifier. Sessions are created on first contact
//! lacking a valid header and looked up by header afterwards.
//!
//! Sessions are never expired: the map lives for the lifetime of the
//! process. This is an accepted unbounded-memory trade-off (see
//! DESIGN.md); adding a sweep would change observable behavior for
//! long-lived clients that reconnect on an old session id.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

/// A tracked client session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque token issued to the client, echoed in `Mcp-Session-Id`
    pub session_id: String,
    /// Stable identifier used to address this client's event channel
    pub client_id: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Session registry keyed by session id.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: DashMap<String, Session>,
}

impl SessionManager {
    /// Create an empty session manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a session from the inbound header value.
    ///
    /// Reuses the session when the header names a known one; otherwise
    /// mints a fresh session with randomly generated opaque identifiers
    /// (uuid v4, collision probability negligible). An unknown header
    /// value is treated the same as an absent one.
    pub fn resolve(&self, header: Option<&str>) -> Session {
        if let Some(id) = header {
            if let Some(existing) = self.sessions.get(id) {
                return existing.clone();
            }
        }

        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            client_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        };
        debug!(
            session_id = %session.session_id,
            client_id = %session.client_id,
            "Minted new session"
        );
        self.sessions
            .insert(session.session_id.clone(), session.clone());
        session
    }

    /// Look up a session without creating one.
    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    /// Number of tracked sessions.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}
