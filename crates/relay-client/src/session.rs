//! The connection task.
//!
//! One task per client owns the transport connection. It is the only writer
//! of topic values and connectivity, so inbound messages are applied one at a
//! time in arrival order.

use relay_core::{Applied, Clock, TopicStore};
use relay_protocol::codec;
use relay_transport::{Connection, ExponentialBackoff, Transport, TransportError};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::metrics::{self, ConnectedGuard};
use crate::subscription::stopped;

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; waiting to (re)connect.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The transport is open.
    Connected,
    /// Shut down for good.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why a session ended.
enum SessionEnd {
    Shutdown,
    Closed,
    Failed(TransportError),
}

pub(crate) struct Session {
    pub(crate) url: String,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) store: Arc<TopicStore>,
    pub(crate) reconnect: ExponentialBackoff,
    pub(crate) outbound: mpsc::UnboundedReceiver<String>,
    pub(crate) shutdown: watch::Receiver<bool>,
    pub(crate) state: watch::Sender<ConnectionState>,
}

impl Session {
    pub(crate) async fn run(mut self) {
        let mut attempt = 0usize;

        loop {
            if self.stopping() {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            let result = tokio::select! {
                biased;
                _ = stopped(&mut self.shutdown) => break,
                result = self.transport.connect(&self.url) => result,
            };

            match result {
                Ok(mut conn) => {
                    attempt = 0;
                    let end = self.serve(conn.as_mut()).await;

                    if let Err(e) = conn.close().await {
                        debug!(connection = %conn.id(), error = %e, "Close failed");
                    }
                    self.store.set_connected(false);

                    match end {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Closed => {
                            info!(connection = %conn.id(), url = %self.url, "Connection closed");
                        }
                        SessionEnd::Failed(e) => {
                            warn!(connection = %conn.id(), url = %self.url, error = %e, "Connection failed");
                        }
                    }
                }
                Err(e) => {
                    warn!(url = %self.url, attempt, error = %e, "Connection attempt failed");
                }
            }

            self.set_state(ConnectionState::Disconnected);

            let Some(delay) = self.reconnect.next_delay(attempt) else {
                warn!(url = %self.url, attempt, "Giving up on reconnection");
                break;
            };
            attempt += 1;
            metrics::record_reconnect_attempt();
            debug!(
                url = %self.url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting after backoff"
            );

            tokio::select! {
                biased;
                _ = stopped(&mut self.shutdown) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.store.set_connected(false);
        self.set_state(ConnectionState::Closed);
        info!(url = %self.url, "Connection task stopped");
    }

    async fn serve(&mut self, conn: &mut dyn Connection) -> SessionEnd {
        let mut stale = 0usize;
        while self.outbound.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!(count = stale, "Discarded publishes queued while disconnected");
        }

        let _guard = ConnectedGuard::new();
        self.store.set_connected(true);
        self.set_state(ConnectionState::Connected);
        info!(
            connection = %conn.id(),
            url = %self.url,
            remote = conn.remote_addr().as_deref().unwrap_or("unknown"),
            "Connected"
        );

        loop {
            tokio::select! {
                biased;

                _ = stopped(&mut self.shutdown) => return SessionEnd::Shutdown,

                Some(frame) = self.outbound.recv() => {
                    if let Err(e) = conn.send(frame).await {
                        return SessionEnd::Failed(e);
                    }
                }

                frame = conn.recv() => match frame {
                    Ok(Some(text)) => self.handle_inbound(&text),
                    Ok(None) => return SessionEnd::Closed,
                    Err(e) => return SessionEnd::Failed(e),
                },
            }
        }
    }

    fn handle_inbound(&self, text: &str) {
        metrics::record_inbound(text.len());

        let envelope = match codec::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping malformed envelope");
                metrics::record_decode_error("envelope");
                return;
            }
        };

        let now = self.clock.now_millis();
        match self
            .store
            .apply_message(&envelope.topic, &envelope.payload, envelope.retain, now)
        {
            Ok(Applied::Changed) => {
                trace!(topic = %envelope.topic, retain = envelope.retain, "Topic updated");
            }
            Ok(Applied::Unchanged) => {}
            Err(_) => metrics::record_decode_error("payload"),
        }
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow() || self.shutdown.has_changed().is_err()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Closed.to_string(), "closed");
    }
}
