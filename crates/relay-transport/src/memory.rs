//! In-process transport.
//!
//! [`MemoryTransport`] is handed to the client; the paired [`MemoryServer`]
//! stays with the test (or embedding host) and yields a [`MemoryPeer`] for
//! every connection the client opens.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::traits::{Connection, ConnectionId, Transport, TransportError};

#[derive(Debug, Default)]
struct Shared {
    urls: Mutex<Vec<String>>,
    failures: AtomicUsize,
    connects: AtomicUsize,
}

/// Client half of the in-memory transport.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
    shared: Arc<Shared>,
}

/// Server half: accepts the connections the client opens.
#[derive(Debug)]
pub struct MemoryServer {
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
    shared: Arc<Shared>,
}

impl MemoryTransport {
    /// Create a connected transport/server pair.
    #[must_use]
    pub fn pair() -> (Self, MemoryServer) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());
        (
            Self {
                accept_tx,
                shared: Arc::clone(&shared),
            },
            MemoryServer { accept_rx, shared },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, TransportError> {
        self.shared.urls.lock().await.push(url.to_string());

        let pending = self.shared.failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.shared.failures.store(pending - 1, Ordering::SeqCst);
            debug!(url, "Refusing memory connection");
            return Err(TransportError::ConnectFailed("connection refused".into()));
        }

        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        let id = ConnectionId::generate();

        let peer = MemoryPeer {
            id: id.clone(),
            to_client: Some(to_client),
            from_client,
        };
        self.accept_tx
            .send(peer)
            .map_err(|_| TransportError::ConnectFailed("memory server dropped".into()))?;
        self.shared.connects.fetch_add(1, Ordering::SeqCst);

        debug!(url, connection = %id, "Memory connection opened");
        Ok(Box::new(MemoryConnection {
            id,
            inbound,
            outbound,
            is_open: true,
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl MemoryServer {
    /// Wait for the client's next connection.
    ///
    /// Returns `None` once the transport is dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.recv().await
    }

    /// Refuse the next `count` connection attempts.
    pub fn fail_next(&self, count: usize) {
        self.shared.failures.store(count, Ordering::SeqCst);
    }

    /// URLs of every connection attempt, in order.
    pub async fn urls(&self) -> Vec<String> {
        self.shared.urls.lock().await.clone()
    }

    /// Number of connections opened successfully.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }
}

/// The server's view of one connection.
#[derive(Debug)]
pub struct MemoryPeer {
    id: ConnectionId,
    to_client: Option<mpsc::UnboundedSender<String>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// The connection's identifier.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Deliver a text frame to the client.
    ///
    /// Returns `false` if the connection is closed.
    pub fn push(&self, text: impl Into<String>) -> bool {
        self.to_client
            .as_ref()
            .is_some_and(|tx| tx.send(text.into()).is_ok())
    }

    /// Wait for the next frame the client sent.
    ///
    /// Returns `None` once the client closed the connection.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Take a frame the client already sent, without waiting.
    pub fn try_next_sent(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Close the connection from the server side.
    pub fn close(&mut self) {
        self.to_client = None;
    }

    /// Whether the client side has gone away.
    #[must_use]
    pub fn is_client_closed(&self) -> bool {
        self.to_client.as_ref().map_or(true, |tx| tx.is_closed())
    }
}

struct MemoryConnection {
    id: ConnectionId,
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
    is_open: bool,
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        if !self.is_open {
            return Ok(None);
        }
        let frame = self.inbound.recv().await;
        if frame.is_none() {
            debug!(connection = %self.id, "Memory peer closed");
            self.is_open = false;
        }
        Ok(frame)
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }
        self.outbound
            .send(text)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_open {
            return Ok(());
        }
        self.is_open = false;
        self.inbound.close();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}
