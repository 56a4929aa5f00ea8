//! WebSocket transport implementation.
//!
//! This module provides a WebSocket client transport using tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::traits::{Connection, ConnectionId, Transport, TransportError};

/// WebSocket transport configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Maximum inbound frame size in bytes. Larger frames are dropped.
    pub max_message_size: usize,
    /// Time allowed for the TCP connect and handshake.
    pub connect_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: 1024 * 1024, // 1 MiB
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// WebSocket client transport.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport {
    config: WebSocketConfig,
}

impl WebSocketTransport {
    /// Create a new WebSocket transport.
    #[must_use]
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }

    /// Get the transport configuration.
    #[must_use]
    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, TransportError> {
        debug!(url, "Opening WebSocket connection");

        let (stream, response) = tokio::time::timeout(self.config.connect_timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        info!(url, status = %response.status(), "WebSocket connected");

        let conn = WebSocketConnection::new(stream, url, self.config.max_message_size);
        Ok(Box::new(conn))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// A WebSocket client connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    url: String,
    is_open: bool,
    max_message_size: usize,
}

impl WebSocketConnection {
    fn new(
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
        url: &str,
        max_message_size: usize,
    ) -> Self {
        Self {
            id: ConnectionId::generate(),
            stream,
            url: url.to_string(),
            is_open: true,
            max_message_size,
        }
    }

    fn accept_size(&self, len: usize) -> bool {
        if len > self.max_message_size {
            warn!(
                connection = %self.id,
                "Dropping oversized frame: {} bytes (max: {})",
                len,
                self.max_message_size
            );
            return false;
        }
        true
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        if !self.is_open {
            return Ok(None);
        }

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    if self.accept_size(text.len()) {
                        return Ok(Some(text));
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    if !self.accept_size(data.len()) {
                        continue;
                    }
                    match String::from_utf8(data) {
                        Ok(text) => return Ok(Some(text)),
                        Err(_) => warn!(connection = %self.id, "Dropping non-UTF-8 binary frame"),
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    // Respond to ping with pong
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        warn!("Failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Pong(_))) => {
                    // Ignore pong messages
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(connection = %self.id, ?frame, "Received close frame");
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Ok(Message::Frame(_))) => {
                    // Raw frame, ignore
                }
                Some(Err(WsError::ConnectionClosed)) => {
                    debug!(connection = %self.id, "Connection closed");
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    error!(connection = %self.id, "WebSocket error: {}", e);
                    self.is_open = false;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!(connection = %self.id, "WebSocket stream ended");
                    self.is_open = false;
                    return Ok(None);
                }
            }
        }
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_open {
            return Ok(()); // Already closed
        }
        self.is_open = false;

        self.stream
            .close(None)
            .await
            .map_err(|e| TransportError::Other(format!("Failed to close: {}", e)))
    }

    fn remote_addr(&self) -> Option<String> {
        Some(self.url.clone())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[test]
    fn test_websocket_config_default() {
        let config = WebSocketConfig::default();
        assert_eq!(config.max_message_size, 1024 * 1024);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_text_frames_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text("from-server".into())).await.unwrap();
            ws.send(Message::Binary(b"binary-text".to_vec())).await.unwrap();
            let echoed = ws.next().await.unwrap().unwrap();
            ws.close(None).await.unwrap();
            echoed
        });

        let transport = WebSocketTransport::default();
        let mut conn = transport
            .connect(&format!("ws://{}/ws", addr))
            .await
            .unwrap();

        assert_eq!(conn.recv().await.unwrap().as_deref(), Some("from-server"));
        assert_eq!(conn.recv().await.unwrap().as_deref(), Some("binary-text"));
        conn.send("from-client".into()).await.unwrap();

        assert_eq!(conn.recv().await.unwrap(), None);
        assert!(!conn.is_open());

        let echoed = server.await.unwrap();
        assert_eq!(echoed, Message::Text("from-client".into()));
    }

    #[tokio::test]
    async fn test_unusable_frames_are_dropped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text("x".repeat(64))).await.unwrap();
            ws.send(Message::Binary(vec![0xff, 0xfe, 0xfd])).await.unwrap();
            ws.send(Message::Text("ok".into())).await.unwrap();
            let reply = ws.next().await.unwrap().unwrap();
            ws.close(None).await.unwrap();
            reply
        });

        let transport = WebSocketTransport::new(WebSocketConfig {
            max_message_size: 16,
            ..WebSocketConfig::default()
        });
        let mut conn = transport
            .connect(&format!("ws://{}/ws", addr))
            .await
            .unwrap();

        assert_eq!(conn.recv().await.unwrap().as_deref(), Some("ok"));
        assert!(conn.is_open());
        conn.send("still-here".into()).await.unwrap();

        assert_eq!(server.await.unwrap(), Message::Text("still-here".into()));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = WebSocketTransport::default();
        let result = transport.connect(&format!("ws://{}/ws", addr)).await;
        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }
}
