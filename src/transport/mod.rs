//! The transport layer: JSON-RPC parsing, method routing, session
//! tracking, event-stream framing, and the HTTP server.

pub mod jsonrpc;
pub mod router;
pub mod server;
pub mod session;
pub mod sse;

pub use jsonrpc::{RpcId, RpcRequest, RpcResponse, parse_request};
pub use router::{NeverStream, ProtocolRouter, StreamPolicy};
pub use server::{GatewayState, ServerConfig};
pub use session::{Session, SessionManager};
pub use sse::{SseBroadcaster, SseFrame};
