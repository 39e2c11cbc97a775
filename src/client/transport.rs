//! Duplex connection to the remote reasoning service.
//!
//! The session task talks to a [`Transport`] trait object so the lifecycle
//! machinery can be exercised against an in-memory link; [`WsConnector`] is
//! the production implementation over a WebSocket.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use url::Url;

use crate::error::{LiveError, Result};
use crate::types::{ClientMessage, ServerMessage};

/// Default live endpoint of the reasoning service.
pub const LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// One open duplex link. Dropped messages degrade quality, never state.
#[async_trait]
pub trait Transport: Send {
    /// Serializes and sends one outbound message.
    async fn send(&mut self, message: ClientMessage) -> Result<()>;

    /// Awaits the next inbound message. `None` means the peer closed the
    /// link; `Some(Err(_))` is an unrecoverable transport error.
    async fn next_message(&mut self) -> Option<Result<ServerMessage>>;

    /// Best-effort close of the link. Never errors.
    async fn close(&mut self);
}

/// Opens transports. Owned by the lifecycle controller so every activation
/// gets a fresh link.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, api_key: &str) -> Result<Box<dyn Transport>>;
}

/// WebSocket connector carrying the service credential as a query parameter.
pub struct WsConnector {
    endpoint: String,
}

impl WsConnector {
    pub fn new() -> Self {
        Self {
            endpoint: LIVE_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, api_key: &str) -> Result<Box<dyn Transport>> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| LiveError::Transport(format!("invalid endpoint: {}", e)))?;
        url.query_pairs_mut().append_pair("key", api_key);

        let (socket, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| LiveError::Transport(e.to_string()))?;
        debug!("[Transport] WebSocket connected.");
        Ok(Box::new(WsTransport { socket }))
    }
}

pub struct WsTransport {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, message: ClientMessage) -> Result<()> {
        let json = serde_json::to_string(&message)
            .map_err(|e| LiveError::Internal(format!("outbound serialization: {}", e)))?;
        self.socket
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| LiveError::Transport(e.to_string()))
    }

    async fn next_message(&mut self) -> Option<Result<ServerMessage>> {
        while let Some(item) = self.socket.next().await {
            match item {
                Ok(Message::Text(text)) => match serde_json::from_str(text.as_str()) {
                    Ok(message) => return Some(Ok(message)),
                    Err(e) => {
                        warn!("[Transport] Undecodable text message skipped: {}", e);
                    }
                },
                Ok(Message::Binary(bytes)) => match serde_json::from_slice(&bytes) {
                    Ok(message) => return Some(Ok(message)),
                    Err(e) => {
                        warn!("[Transport] Undecodable binary message skipped: {}", e);
                    }
                },
                Ok(Message::Close(_)) => return None,
                Ok(_) => {} // ping/pong handled by the library
                Err(e) => return Some(Err(LiveError::Transport(e.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self) {
        if let Err(e) = self.socket.close(None).await {
            debug!("[Transport] Close handshake failed: {}", e);
        }
    }
}
