//! Coedit Realtime Hub
//!
//! Authenticates transport connections, manages per-document broadcast
//! rooms, and propagates durable change notifications and ephemeral
//! collaboration signals (cursor/selection/presence). Fan-out is in-process
//! and scoped to a single server instance.

pub mod auth;
pub mod connection;
pub mod hub;
pub mod rooms;
pub mod server;

pub use auth::{AuthResolver, StaticTokenResolver, UserIdentity};
pub use connection::ConnectionHandler;
pub use hub::{HubError, RealtimeHub};
pub use rooms::{ConnectionId, RoomRegistry};
pub use server::WebSocketServer;
