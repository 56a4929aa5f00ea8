//! Consumer handles: topic subscriptions, publishers, feature switches and
//! whole-snapshot watches.

use relay_core::bootstrap::{parse_switch, switch_payload};
use relay_core::{TopicSnapshot, TopicStore, TopicValue, TopicWatch};
use relay_protocol::{codec, Envelope, ProtocolError};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use crate::metrics;

/// Publish failures.
#[derive(Debug, Error)]
pub enum PublishError {
    /// No connection is open; nothing was sent.
    #[error("Not connected")]
    NotConnected,

    /// The client has shut down.
    #[error("Client is shut down")]
    Closed,

    /// The envelope could not be built.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Subscription failures.
#[derive(Debug, Error)]
pub enum SubscribeError {
    /// Topic cannot be watched or published to.
    #[error("Invalid topic {topic:?}: {reason}")]
    InvalidTopic {
        /// Offending topic.
        topic: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// No feature binding has this key.
    #[error("Unknown feature: {0}")]
    UnknownFeature(String),
}

/// The client behind a handle has shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Subscription closed")]
pub struct SubscriptionClosed;

/// Options for a publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Ask the broker to retain the message.
    pub retain: bool,
}

impl PublishOptions {
    /// Options with the retain flag set.
    #[must_use]
    pub fn retained() -> Self {
        Self { retain: true }
    }
}

pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn is_stopped(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

/// Publishes to one topic. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Publisher {
    topic: String,
    store: Arc<TopicStore>,
    outbound: mpsc::UnboundedSender<String>,
}

impl Publisher {
    pub(crate) fn new(
        topic: impl Into<String>,
        store: Arc<TopicStore>,
        outbound: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            store,
            outbound,
        }
    }

    /// The topic this publisher sends to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish `payload` without the retain flag.
    ///
    /// # Errors
    ///
    /// Returns an error if not connected or the payload cannot be encoded.
    pub fn send<T>(&self, payload: &T) -> Result<(), PublishError>
    where
        T: Serialize + ?Sized,
    {
        self.send_with(payload, PublishOptions::default())
    }

    /// Publish `payload`.
    ///
    /// The local store is not touched; the value arrives when the broker
    /// echoes it back.
    ///
    /// # Errors
    ///
    /// Returns an error if not connected or the payload cannot be encoded.
    pub fn send_with<T>(&self, payload: &T, options: PublishOptions) -> Result<(), PublishError>
    where
        T: Serialize + ?Sized,
    {
        if !self.store.is_connected() {
            debug!(topic = %self.topic, "Dropping publish while disconnected");
            return Err(PublishError::NotConnected);
        }

        let envelope = Envelope::publish(self.topic.as_str(), payload, options.retain)?;
        let frame = codec::encode(&envelope)?;
        let size = frame.len();

        self.outbound.send(frame).map_err(|_| PublishError::Closed)?;
        metrics::record_publish(size);
        trace!(topic = %self.topic, retain = options.retain, "Queued publish");
        Ok(())
    }
}

/// A consumer's view of one topic.
///
/// Dropping the subscription unsubscribes it.
#[derive(Debug)]
pub struct Subscription {
    watch: Option<TopicWatch>,
    store: Arc<TopicStore>,
    publisher: Publisher,
    shutdown: watch::Receiver<bool>,
}

impl Subscription {
    pub(crate) fn new(
        watch: TopicWatch,
        store: Arc<TopicStore>,
        publisher: Publisher,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            watch: Some(watch),
            store,
            publisher,
            shutdown,
        }
    }

    /// The watched topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.watch
            .as_ref()
            .map_or(self.publisher.topic(), TopicWatch::topic)
    }

    /// Current value, or `None` if the topic has neither a live nor a
    /// bootstrapped value.
    #[must_use]
    pub fn value(&self) -> Option<TopicValue> {
        match &self.watch {
            Some(watch) => watch.value(),
            None => None,
        }
    }

    /// Whether the shared connection is open.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.store.is_connected()
    }

    /// Whether a change arrived since the last [`changed`](Self::changed).
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.watch.as_ref().is_some_and(TopicWatch::has_changed)
    }

    /// Wait until this topic's value or connectivity changes.
    ///
    /// # Errors
    ///
    /// Returns an error once unsubscribed or the client has shut down.
    pub async fn changed(&mut self) -> Result<(), SubscriptionClosed> {
        let Some(watch) = self.watch.as_mut() else {
            return Err(SubscriptionClosed);
        };
        if is_stopped(&self.shutdown) {
            return Err(SubscriptionClosed);
        }

        tokio::select! {
            res = watch.changed() => res.map_err(|_| SubscriptionClosed),
            _ = stopped(&mut self.shutdown) => Err(SubscriptionClosed),
        }
    }

    /// The bound publisher.
    #[must_use]
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// Publish to the bound topic without the retain flag.
    ///
    /// # Errors
    ///
    /// See [`Publisher::send_with`].
    pub fn send<T>(&self, payload: &T) -> Result<(), PublishError>
    where
        T: Serialize + ?Sized,
    {
        self.publisher.send(payload)
    }

    /// Publish to the bound topic.
    ///
    /// # Errors
    ///
    /// See [`Publisher::send_with`].
    pub fn send_with<T>(&self, payload: &T, options: PublishOptions) -> Result<(), PublishError>
    where
        T: Serialize + ?Sized,
    {
        self.publisher.send_with(payload, options)
    }

    /// Stop watching. Calling it again does nothing.
    pub fn unsubscribe(&mut self) {
        if let Some(watch) = self.watch.take() {
            let topic = watch.topic().to_string();
            drop(watch);
            self.store.release(&topic);
            debug!(topic = %topic, "Unsubscribed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// An `ON`/`OFF` switch: watches `<entity>/<segment>/state` and publishes to
/// `<entity>/<segment>/set`.
#[derive(Debug)]
pub struct FeatureSwitch {
    subscription: Subscription,
}

impl FeatureSwitch {
    pub(crate) fn new(subscription: Subscription) -> Self {
        Self { subscription }
    }

    /// Current state, if known and well-formed.
    #[must_use]
    pub fn is_on(&self) -> Option<bool> {
        self.subscription
            .value()
            .and_then(|value| parse_switch(&value.payload))
    }

    /// Ask the broker to switch the feature.
    ///
    /// # Errors
    ///
    /// See [`Publisher::send_with`].
    pub fn set(&self, on: bool) -> Result<(), PublishError> {
        self.subscription.send(switch_payload(on))
    }

    /// Wait for the state or connectivity to change.
    ///
    /// # Errors
    ///
    /// Returns an error once the client has shut down.
    pub async fn changed(&mut self) -> Result<(), SubscriptionClosed> {
        self.subscription.changed().await
    }

    /// The underlying subscription.
    #[must_use]
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

/// Watches the whole store.
#[derive(Debug)]
pub struct SnapshotWatch {
    store: Arc<TopicStore>,
    revision: watch::Receiver<u64>,
    shutdown: watch::Receiver<bool>,
}

impl SnapshotWatch {
    pub(crate) fn new(store: Arc<TopicStore>, shutdown: watch::Receiver<bool>) -> Self {
        let revision = store.watch_revision();
        Self {
            store,
            revision,
            shutdown,
        }
    }

    /// Every populated topic and the connectivity flag.
    #[must_use]
    pub fn current(&self) -> TopicSnapshot {
        self.store.snapshot()
    }

    /// Wait until any topic or connectivity changes.
    ///
    /// # Errors
    ///
    /// Returns an error once the client has shut down.
    pub async fn changed(&mut self) -> Result<(), SubscriptionClosed> {
        if is_stopped(&self.shutdown) {
            return Err(SubscriptionClosed);
        }

        tokio::select! {
            res = self.revision.changed() => res.map_err(|_| SubscriptionClosed),
            _ = stopped(&mut self.shutdown) => Err(SubscriptionClosed),
        }
    }
}
