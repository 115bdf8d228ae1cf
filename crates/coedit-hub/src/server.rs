//! WebSocket transport for the realtime hub

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info};

use crate::hub::RealtimeHub;
use coedit_protocol::{ClientEvent, ServerEvent};

/// WebSocket server fronting a `RealtimeHub`
pub struct WebSocketServer {
    hub: Arc<RealtimeHub>,
    addr: SocketAddr,
}

impl WebSocketServer {
    pub fn new(hub: Arc<RealtimeHub>, addr: SocketAddr) -> Self {
        Self { hub, addr }
    }

    /// Start the WebSocket server
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "Coedit WebSocket server listening");

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let hub = self.hub.clone();

                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, hub).await {
                            error!(peer = %peer_addr, error = %e, "WebSocket connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Serve one connection: auth-first handshake, then the event loop.
    ///
    /// Faults stay scoped to this connection; a malformed frame produces an
    /// `error` event here and nothing anywhere else.
    pub async fn handle_connection(
        stream: TcpStream,
        hub: Arc<RealtimeHub>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = accept_async(stream).await?;
        let (mut write, mut read) = ws_stream.split();

        // The first frame must carry the bearer token. Anything else is
        // rejected before any room state exists.
        let token = match read.next().await {
            Some(Ok(Message::Text(text))) => match ClientEvent::decode(&text) {
                Ok(ClientEvent::Auth { token }) => token,
                _ => {
                    let event = ServerEvent::error("Authentication required");
                    write.send(Message::Text(event.encode()?)).await?;
                    return Ok(());
                }
            },
            _ => return Ok(()),
        };

        let (mut handler, mut deliveries) = match hub.open_connection(&token).await {
            Ok(admitted) => admitted,
            Err(e) => {
                let event = ServerEvent::error(e.to_string());
                write.send(Message::Text(event.encode()?)).await?;
                return Ok(());
            }
        };

        loop {
            tokio::select! {
                // Frames from the client
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let response = match ClientEvent::decode(&text) {
                                Ok(event) => handler.handle_event(event).await,
                                Err(e) => {
                                    debug!(client = handler.conn_id(), error = %e, "Malformed frame");
                                    Some(ServerEvent::error(e.to_string()))
                                }
                            };

                            if let Some(event) = response {
                                write.send(Message::Text(event.encode()?)).await?;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!(client = handler.conn_id(), "Client disconnected");
                            break;
                        }
                        Some(Ok(_)) => {
                            // Ignore binary and other frame types
                        }
                        Some(Err(e)) => {
                            error!(client = handler.conn_id(), error = %e, "WebSocket read error");
                            break;
                        }
                    }
                }

                // Room deliveries for this connection
                delivery = deliveries.recv() => {
                    match delivery {
                        Some(event) => {
                            if let Err(e) = write.send(Message::Text(event.encode()?)).await {
                                error!(client = handler.conn_id(), error = %e, "WebSocket write error");
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        handler.disconnect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenResolver;
    use coedit_store::{DocumentRepository, MemoryStorage};
    use tokio_tungstenite::connect_async;

    async fn spawn_server() -> (Arc<RealtimeHub>, SocketAddr) {
        let repository = Arc::new(DocumentRepository::new(Arc::new(MemoryStorage::new())));
        let mut resolver = StaticTokenResolver::default();
        resolver.insert("token-alice", "alice");
        let hub = Arc::new(RealtimeHub::new(repository, Arc::new(resolver)));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept_hub = hub.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => break,
                };
                let hub = accept_hub.clone();
                tokio::spawn(async move {
                    let _ = WebSocketServer::handle_connection(stream, hub).await;
                });
            }
        });

        (hub, addr)
    }

    async fn recv_event(
        ws: &mut (impl futures_util::Stream<
            Item = Result<Message, tokio_tungstenite::tungstenite::Error>,
        > + Unpin),
    ) -> ServerEvent {
        loop {
            match ws.next().await.expect("stream ended").unwrap() {
                Message::Text(text) => return ServerEvent::decode(&text).unwrap(),
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_invalid_token_is_rejected_before_any_join() {
        let (hub, addr) = spawn_server().await;

        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        ws.send(Message::Text(
            r#"{"type":"auth","token":"wrong"}"#.to_string(),
        ))
        .await
        .unwrap();

        let event = recv_event(&mut ws).await;
        assert_eq!(event, ServerEvent::error("Authentication failed"));

        // No membership was ever created
        assert_eq!(hub.rooms().room_count(), 0);
    }

    #[tokio::test]
    async fn test_first_frame_must_be_auth() {
        let (_hub, addr) = spawn_server().await;

        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        ws.send(Message::Text(r#"{"type":"ping"}"#.to_string()))
            .await
            .unwrap();

        let event = recv_event(&mut ws).await;
        assert_eq!(event, ServerEvent::error("Authentication required"));
    }

    #[tokio::test]
    async fn test_ping_pong_after_handshake() {
        let (_hub, addr) = spawn_server().await;

        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        ws.send(Message::Text(
            r#"{"type":"auth","token":"token-alice"}"#.to_string(),
        ))
        .await
        .unwrap();

        ws.send(Message::Text(r#"{"type":"ping"}"#.to_string()))
            .await
            .unwrap();

        assert_eq!(recv_event(&mut ws).await, ServerEvent::Pong);
    }

    #[tokio::test]
    async fn test_subscribe_over_the_wire() {
        let (hub, addr) = spawn_server().await;
        let doc = hub
            .repository()
            .create("alice", "Notes", "hello", "text")
            .await
            .unwrap();

        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        ws.send(Message::Text(
            r#"{"type":"auth","token":"token-alice"}"#.to_string(),
        ))
        .await
        .unwrap();

        ws.send(Message::Text(format!(
            r#"{{"type":"document:subscribe","documentId":"{}"}}"#,
            doc.id
        )))
        .await
        .unwrap();

        assert_eq!(
            recv_event(&mut ws).await,
            ServerEvent::subscribed(doc.id.to_string())
        );
    }

    #[tokio::test]
    async fn test_malformed_frame_is_scoped_to_the_connection() {
        let (_hub, addr) = spawn_server().await;

        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        ws.send(Message::Text(
            r#"{"type":"auth","token":"token-alice"}"#.to_string(),
        ))
        .await
        .unwrap();

        ws.send(Message::Text("not json".to_string())).await.unwrap();
        assert!(matches!(
            recv_event(&mut ws).await,
            ServerEvent::Error { .. }
        ));

        // The connection is still serviceable afterwards
        ws.send(Message::Text(r#"{"type":"ping"}"#.to_string()))
            .await
            .unwrap();
        assert_eq!(recv_event(&mut ws).await, ServerEvent::Pong);
    }
}
