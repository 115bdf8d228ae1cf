//! The realtime hub

use crate::auth::{AuthResolver, UserIdentity};
use crate::connection::ConnectionHandler;
use crate::rooms::{ConnectionId, RoomRegistry};
use coedit_protocol::{RoomKey, ServerEvent};
use coedit_store::{DocumentChange, DocumentRepository};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Hub error types
#[derive(Error, Debug)]
pub enum HubError {
    #[error("Authentication failed")]
    AuthenticationFailed,
}

/// Authenticates connections and owns the room registry.
///
/// Explicitly constructed and injected (no global singleton), so multiple
/// isolated hubs can coexist in one process.
pub struct RealtimeHub {
    repository: Arc<DocumentRepository>,
    resolver: Arc<dyn AuthResolver>,
    rooms: Arc<RoomRegistry>,
    connection_counter: AtomicU64,
}

impl RealtimeHub {
    pub fn new(repository: Arc<DocumentRepository>, resolver: Arc<dyn AuthResolver>) -> Self {
        Self {
            repository,
            resolver,
            rooms: Arc::new(RoomRegistry::new()),
            connection_counter: AtomicU64::new(0),
        }
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    pub fn repository(&self) -> &Arc<DocumentRepository> {
        &self.repository
    }

    /// Resolve a bearer token. Rejection happens before any mutation.
    pub async fn authenticate(&self, token: &str) -> Result<UserIdentity, HubError> {
        match self.resolver.resolve(token).await {
            Some(identity) => Ok(identity),
            None => {
                warn!("Rejected connection with invalid token");
                Err(HubError::AuthenticationFailed)
            }
        }
    }

    /// Authenticate and admit one connection.
    ///
    /// On success the connection is joined to its private user room and the
    /// receiver carries its room deliveries. On failure nothing is created:
    /// no partial membership state exists for a failed handshake.
    pub async fn open_connection(
        &self,
        token: &str,
    ) -> Result<(ConnectionHandler, mpsc::UnboundedReceiver<ServerEvent>), HubError> {
        let identity = self.authenticate(token).await?;

        let conn_id: ConnectionId = self.connection_counter.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        info!(client = conn_id, user = %identity.user_id, "Connection authenticated");

        let handler = ConnectionHandler::new(
            conn_id,
            identity,
            self.repository.clone(),
            self.rooms.clone(),
            tx,
        );

        Ok((handler, rx))
    }

    /// Forward the repository's durable change feed into document rooms.
    ///
    /// `document:updated` and `document:deleted` go to every subscriber of
    /// the room, the originator included, so every client can refresh.
    pub fn spawn_change_forwarder(self: &Arc<Self>) -> JoinHandle<()> {
        let hub = self.clone();
        let mut changes = self.repository.subscribe_changes();

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(DocumentChange::Updated {
                        document_id,
                        etag,
                        updated_at,
                        user_id,
                    }) => {
                        let event = ServerEvent::DocumentUpdated {
                            document_id: document_id.to_string(),
                            etag,
                            updated_at,
                            user_id,
                        };
                        let delivered = hub
                            .rooms
                            .broadcast(&RoomKey::Document(document_id), &event);
                        debug!(delivered = delivered, "Forwarded document update");
                    }
                    Ok(DocumentChange::Deleted { document_id }) => {
                        let event = ServerEvent::DocumentDeleted {
                            document_id: document_id.to_string(),
                        };
                        hub.rooms
                            .broadcast(&RoomKey::Document(document_id), &event);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed = missed, "Change forwarder lagged behind writes");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
