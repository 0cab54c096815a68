/// WebSocket Module
///
/// Real-time delivery for the chat service:
///
/// - Frame protocol (ClientFrame & ServerFrame)
/// - ConnectionHub actor (local connections of this process)
/// - Presence registry and cross-process fan-out bus (Redis)
/// - ConnectionManager (deliver to a user wherever they are connected)
/// - HTTP handler (upgrade HTTP to WebSocket)
pub mod events;
pub mod fanout;
pub mod handler;
pub mod manager;
pub mod message;
pub mod presence;
pub mod server;
