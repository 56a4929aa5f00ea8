//! The topic client: owns the shared connection and hands out subscriptions.

use relay_core::{
    derive, Clock, ConstructionError, EntityConfig, FeatureMap, TopicSnapshot, TopicStore,
    TopicValue,
};
use relay_protocol::topic::validate_segment;
use relay_protocol::validate_topic;
use relay_transport::{ExponentialBackoff, Transport};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::session::{ConnectionState, Session};
use crate::subscription::{FeatureSwitch, Publisher, SnapshotWatch, SubscribeError, Subscription};

/// Everything needed to start a client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Broker endpoint.
    pub url: String,
    /// Entity configuration used to derive bootstrap topics.
    pub entities: EntityConfig,
    /// Feature key to topic segment bindings.
    pub features: FeatureMap,
    /// Reconnection policy.
    pub reconnect: ExponentialBackoff,
}

impl ClientOptions {
    /// Options for `url` with no entities, the default feature map and the
    /// default reconnection policy.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            entities: EntityConfig::new(),
            features: FeatureMap::default(),
            reconnect: ExponentialBackoff::default(),
        }
    }

    /// Set the entity configuration.
    #[must_use]
    pub fn with_entities(mut self, entities: EntityConfig) -> Self {
        self.entities = entities;
        self
    }

    /// Set the feature map.
    #[must_use]
    pub fn with_features(mut self, features: FeatureMap) -> Self {
        self.features = features;
        self
    }

    /// Set the reconnection policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ExponentialBackoff) -> Self {
        self.reconnect = reconnect;
        self
    }
}

/// Mirrors a broker's topic space over one connection.
///
/// Dropping the client stops its connection task; [`shutdown`](Self::shutdown)
/// does the same and waits for it.
#[derive(Debug)]
pub struct TopicClient {
    store: Arc<TopicStore>,
    outbound: mpsc::UnboundedSender<String>,
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<ConnectionState>,
    features: FeatureMap,
    task: JoinHandle<()>,
}

impl TopicClient {
    /// Seed the store from the entity configuration and spawn the connection
    /// task. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity configuration or feature map is
    /// malformed. Nothing is spawned in that case.
    pub fn start(
        options: ClientOptions,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConstructionError> {
        let ClientOptions {
            url,
            entities,
            features,
            reconnect,
        } = options;

        let seed = derive(&entities, &features, clock.now_millis())?;
        let store = Arc::new(TopicStore::seeded(seed));

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);

        info!(url = %url, transport = transport.name(), "Starting topic client");

        let session = Session {
            url,
            transport,
            clock,
            store: Arc::clone(&store),
            reconnect,
            outbound: outbound_rx,
            shutdown: shutdown_rx,
            state: state_tx,
        };
        let task = tokio::spawn(session.run());

        Ok(Self {
            store,
            outbound,
            shutdown,
            state,
            features,
            task,
        })
    }

    /// Start a client on the WebSocket transport with the system clock.
    ///
    /// # Errors
    ///
    /// See [`start`](Self::start).
    #[cfg(feature = "websocket")]
    pub fn connect_websocket(
        options: ClientOptions,
        config: relay_transport::WebSocketConfig,
    ) -> Result<Self, ConstructionError> {
        Self::start(
            options,
            Arc::new(relay_transport::WebSocketTransport::new(config)),
            Arc::new(relay_core::SystemClock),
        )
    }

    /// Watch `topic` and publish to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic is empty, reserved or contains
    /// wildcards.
    pub fn subscribe(&self, topic: &str) -> Result<Subscription, SubscribeError> {
        self.subscribe_with(topic, topic)
    }

    /// Watch `watch_topic` and publish to `publish_topic`.
    ///
    /// # Errors
    ///
    /// Returns an error if either topic is invalid.
    pub fn subscribe_with(
        &self,
        watch_topic: &str,
        publish_topic: &str,
    ) -> Result<Subscription, SubscribeError> {
        check_topic(watch_topic)?;
        check_topic(publish_topic)?;

        let publisher = Publisher::new(publish_topic, Arc::clone(&self.store), self.outbound.clone());
        let subscription = Subscription::new(
            self.store.watch(watch_topic),
            Arc::clone(&self.store),
            publisher,
            self.shutdown.subscribe(),
        );
        debug!(topic = %watch_topic, publish = %publish_topic, "Subscribed");
        Ok(subscription)
    }

    /// A publisher for `topic` with no watch attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic is invalid.
    pub fn publisher(&self, topic: &str) -> Result<Publisher, SubscribeError> {
        check_topic(topic)?;
        Ok(Publisher::new(topic, Arc::clone(&self.store), self.outbound.clone()))
    }

    /// The `ON`/`OFF` switch for one feature of one entity.
    ///
    /// # Errors
    ///
    /// Returns an error if `key` has no binding or `entity` cannot be used as
    /// a topic segment.
    pub fn feature(&self, entity: &str, key: &str) -> Result<FeatureSwitch, SubscribeError> {
        let binding = self
            .features
            .get(key)
            .ok_or_else(|| SubscribeError::UnknownFeature(key.to_string()))?;

        validate_segment(entity).map_err(|reason| SubscribeError::InvalidTopic {
            topic: entity.to_string(),
            reason,
        })?;

        let subscription =
            self.subscribe_with(&binding.state_topic(entity), &binding.command_topic(entity))?;
        Ok(FeatureSwitch::new(subscription))
    }

    /// Current value of `topic`.
    #[must_use]
    pub fn get(&self, topic: &str) -> Option<TopicValue> {
        self.store.get(topic)
    }

    /// Every populated topic and the connectivity flag.
    #[must_use]
    pub fn snapshot(&self) -> TopicSnapshot {
        self.store.snapshot()
    }

    /// Watch the whole store.
    #[must_use]
    pub fn watch_snapshot(&self) -> SnapshotWatch {
        SnapshotWatch::new(Arc::clone(&self.store), self.shutdown.subscribe())
    }

    /// Whether the connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.store.is_connected()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe connection state transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// The shared store.
    #[must_use]
    pub fn store(&self) -> &Arc<TopicStore> {
        &self.store
    }

    /// Stop the connection task and wait for it to finish.
    ///
    /// Every subscription's `changed()` resolves with `SubscriptionClosed`.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Connection task ended abnormally");
        }
        info!("Topic client shut down");
    }
}

fn check_topic(topic: &str) -> Result<(), SubscribeError> {
    validate_topic(topic).map_err(|reason| SubscribeError::InvalidTopic {
        topic: topic.to_string(),
        reason,
    })
}
