//! # relay-transport
//!
//! Client-side transports for the relay topic mirror.
//!
//! - **WebSocket** - the production transport, one text frame per envelope
//! - **Memory** - an in-process transport for tests and embedding
//!
//! ## Transport Abstraction
//!
//! A [`Transport`] opens connections; a [`Connection`] carries text frames
//! both ways. A successful `connect` is the "opened" event, `recv` yielding
//! `None` (or an error) is "closed".
//!
//! ```rust,ignore
//! use relay_transport::{Connection, Transport};
//!
//! async fn pump(transport: &dyn Transport) {
//!     let mut conn = transport.connect("ws://127.0.0.1:5000/ws").await.unwrap();
//!     while let Ok(Some(text)) = conn.recv().await {
//!         // Decode envelope
//!     }
//! }
//! ```

pub mod memory;
pub mod reconnect;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::{MemoryPeer, MemoryServer, MemoryTransport};
pub use reconnect::ExponentialBackoff;
pub use traits::{Connection, ConnectionId, Transport, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketTransport};
