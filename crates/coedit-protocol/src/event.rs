//! Client and server wire events

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The one error message for both "document does not exist" and "document
/// exists but is owned by someone else". Uniform by design so the error
/// surface never reveals which of the two happened.
pub const ACCESS_DENIED_MESSAGE: &str = "Document not found or access denied";

/// Events sent by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Handshake; must be the first frame on a new connection
    #[serde(rename = "auth")]
    Auth { token: String },

    #[serde(rename = "document:subscribe", rename_all = "camelCase")]
    Subscribe { document_id: String },

    #[serde(rename = "document:unsubscribe", rename_all = "camelCase")]
    Unsubscribe { document_id: String },

    #[serde(rename = "cursor:update", rename_all = "camelCase")]
    CursorUpdate { document_id: String, position: Value },

    #[serde(rename = "selection:update", rename_all = "camelCase")]
    SelectionUpdate { document_id: String, selection: Value },

    #[serde(rename = "presence:update", rename_all = "camelCase")]
    PresenceUpdate { document_id: String, status: Value },

    #[serde(rename = "ping")]
    Ping,
}

impl ClientEvent {
    /// Decode a text frame
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Encode to a text frame
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }
}

/// Events sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "document:subscribed", rename_all = "camelCase")]
    Subscribed { document_id: String },

    #[serde(rename = "document:unsubscribed", rename_all = "camelCase")]
    Unsubscribed { document_id: String },

    /// Durable: delivered to every subscriber, the originator included
    #[serde(rename = "document:updated", rename_all = "camelCase")]
    DocumentUpdated {
        document_id: String,
        etag: String,
        updated_at: u64,
        user_id: String,
    },

    /// Durable: delivered to every subscriber
    #[serde(rename = "document:deleted", rename_all = "camelCase")]
    DocumentDeleted { document_id: String },

    /// Ephemeral: never echoed back to the sender
    #[serde(rename = "cursor:updated", rename_all = "camelCase")]
    CursorUpdated { user_id: String, position: Value },

    /// Ephemeral: never echoed back to the sender
    #[serde(rename = "selection:updated", rename_all = "camelCase")]
    SelectionUpdated { user_id: String, selection: Value },

    /// Ephemeral: never echoed back to the sender
    #[serde(rename = "presence:updated", rename_all = "camelCase")]
    PresenceUpdated { user_id: String, status: Value },

    #[serde(rename = "presence:left", rename_all = "camelCase")]
    PresenceLeft { user_id: String },

    #[serde(rename = "error")]
    Error { message: String },

    #[serde(rename = "pong")]
    Pong,
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    /// The uniform not-found/not-owned error
    pub fn access_denied() -> Self {
        Self::error(ACCESS_DENIED_MESSAGE)
    }

    pub fn pong() -> Self {
        ServerEvent::Pong
    }

    pub fn subscribed(document_id: impl Into<String>) -> Self {
        ServerEvent::Subscribed {
            document_id: document_id.into(),
        }
    }

    pub fn unsubscribed(document_id: impl Into<String>) -> Self {
        ServerEvent::Unsubscribed {
            document_id: document_id.into(),
        }
    }

    pub fn presence_left(user_id: impl Into<String>) -> Self {
        ServerEvent::PresenceLeft {
            user_id: user_id.into(),
        }
    }

    /// Encode to a text frame
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Decode a text frame
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}
