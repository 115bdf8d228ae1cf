//! Per-connection state and event handling

use crate::auth::UserIdentity;
use crate::rooms::{ConnectionId, RoomRegistry};
use coedit_core::{DocumentId, Error};
use coedit_protocol::{ClientEvent, RoomKey, ServerEvent};
use coedit_store::DocumentRepository;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Handles one authenticated connection.
///
/// Created only after the handshake succeeded; construction joins the
/// user's private room, so a failed handshake never leaves membership
/// behind.
pub struct ConnectionHandler {
    conn_id: ConnectionId,
    user: UserIdentity,
    repository: Arc<DocumentRepository>,
    rooms: Arc<RoomRegistry>,
    tx: mpsc::UnboundedSender<ServerEvent>,
    subscriptions: HashSet<DocumentId>,
}

impl ConnectionHandler {
    pub fn new(
        conn_id: ConnectionId,
        user: UserIdentity,
        repository: Arc<DocumentRepository>,
        rooms: Arc<RoomRegistry>,
        tx: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        rooms.join(RoomKey::User(user.user_id.clone()), conn_id, tx.clone());

        Self {
            conn_id,
            user,
            repository,
            rooms,
            tx,
            subscriptions: HashSet::new(),
        }
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    pub fn user_id(&self) -> &str {
        &self.user.user_id
    }

    /// Process one client event. The returned event, if any, is the direct
    /// response for this connection; room deliveries arrive through the
    /// connection's channel.
    pub async fn handle_event(&mut self, event: ClientEvent) -> Option<ServerEvent> {
        match event {
            ClientEvent::Auth { .. } => Some(ServerEvent::error("Already authenticated")),
            ClientEvent::Ping => Some(ServerEvent::pong()),
            ClientEvent::Subscribe { document_id } => Some(self.subscribe(&document_id).await),
            ClientEvent::Unsubscribe { document_id } => Some(self.unsubscribe(&document_id)),
            ClientEvent::CursorUpdate {
                document_id,
                position,
            } => self.relay_ephemeral(&document_id, |user_id| ServerEvent::CursorUpdated {
                user_id,
                position,
            }),
            ClientEvent::SelectionUpdate {
                document_id,
                selection,
            } => self.relay_ephemeral(&document_id, |user_id| ServerEvent::SelectionUpdated {
                user_id,
                selection,
            }),
            ClientEvent::PresenceUpdate {
                document_id,
                status,
            } => self.relay_ephemeral(&document_id, |user_id| ServerEvent::PresenceUpdated {
                user_id,
                status,
            }),
        }
    }

    /// Subscribe to a document's room.
    ///
    /// Permitted only when this connection's user owns the document.
    /// "Does not exist" and "owned by someone else" answer with the same
    /// error so the surface never reveals which one happened.
    async fn subscribe(&mut self, document_id: &str) -> ServerEvent {
        let Ok(id) = DocumentId::new(document_id) else {
            return ServerEvent::access_denied();
        };

        match self.repository.find(&id).await {
            Ok(doc) if doc.owner_id == self.user.user_id => {
                self.rooms
                    .join(RoomKey::Document(id.clone()), self.conn_id, self.tx.clone());
                self.subscriptions.insert(id);
                debug!(client = self.conn_id, doc_id = %document_id, "Subscribed");
                ServerEvent::subscribed(document_id)
            }
            Ok(_) | Err(Error::DocumentNotFound(_)) => {
                debug!(client = self.conn_id, doc_id = %document_id, "Subscribe denied");
                ServerEvent::access_denied()
            }
            Err(e) => {
                error!(client = self.conn_id, error = %e, "Subscribe failed");
                ServerEvent::error("Internal error")
            }
        }
    }

    /// Leave a document's room. Idempotent.
    fn unsubscribe(&mut self, document_id: &str) -> ServerEvent {
        if let Ok(id) = DocumentId::new(document_id) {
            if self.subscriptions.remove(&id) {
                self.rooms.leave(&RoomKey::Document(id), self.conn_id);
                debug!(client = self.conn_id, doc_id = %document_id, "Unsubscribed");
            }
        }
        ServerEvent::unsubscribed(document_id)
    }

    /// Fan an ephemeral signal out to the other members of a subscribed
    /// document's room. Never echoes back to this connection.
    fn relay_ephemeral(
        &self,
        document_id: &str,
        build: impl FnOnce(String) -> ServerEvent,
    ) -> Option<ServerEvent> {
        let Ok(id) = DocumentId::new(document_id) else {
            return Some(ServerEvent::error("Not subscribed to document"));
        };

        if !self.subscriptions.contains(&id) {
            return Some(ServerEvent::error("Not subscribed to document"));
        }

        let event = build(self.user.user_id.clone());
        self.rooms
            .broadcast_except(&RoomKey::Document(id), self.conn_id, &event);
        None
    }

    /// Tear down membership. For every document room this connection
    /// belonged to, the remaining members get `presence:left`; membership
    /// is gone before this returns.
    pub fn disconnect(&mut self) {
        for id in self.subscriptions.drain() {
            let key = RoomKey::Document(id);
            self.rooms.leave(&key, self.conn_id);
            self.rooms
                .broadcast(&key, &ServerEvent::presence_left(&self.user.user_id));
        }

        self.rooms
            .leave(&RoomKey::User(self.user.user_id.clone()), self.conn_id);
        debug!(client = self.conn_id, user = %self.user.user_id, "Connection closed");
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        if !self.subscriptions.is_empty() {
            warn!(
                client = self.conn_id,
                "Connection dropped without disconnect(); cleaning up"
            );
            self.disconnect();
        }
    }
}
