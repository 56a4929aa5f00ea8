//! The topic store.
//!
//! One store per client. It maps topic names to their last-known value and
//! tracks transport connectivity. Every topic slot is a `watch` channel, so a
//! change wakes only the watchers of that topic.

use dashmap::DashMap;
use relay_protocol::validate_topic;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::value::{TopicSnapshot, TopicValue};
use crate::watch::TopicWatch;

type Slot = watch::Sender<Option<TopicValue>>;

fn empty_slot() -> Slot {
    watch::channel(None).0
}

/// Inbound updates the store refused.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Topic cannot be stored.
    #[error("Invalid topic {topic:?}: {reason}")]
    InvalidTopic {
        /// Offending topic.
        topic: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Payload is not JSON.
    #[error("Malformed payload on {topic:?}: {source}")]
    Payload {
        /// Topic of the dropped update.
        topic: String,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },
}

/// Result of applying an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The stored value was replaced and watchers were notified.
    Changed,
    /// The stored value already equalled the update.
    Unchanged,
}

/// Store statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Topics holding a value.
    pub topic_count: usize,
    /// Topics with at least one live watch.
    pub watched_topics: usize,
    /// Live topic watches.
    pub watchers: usize,
}

/// Last-known value per topic.
#[derive(Debug)]
pub struct TopicStore {
    /// Slots indexed by topic.
    topics: DashMap<String, Slot>,
    /// Transport connectivity.
    connected: watch::Sender<bool>,
    /// Bumped on every visible change.
    revision: watch::Sender<u64>,
}

impl TopicStore {
    /// Create an empty, disconnected store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
            connected: watch::channel(false).0,
            revision: watch::channel(0).0,
        }
    }

    /// Create a store holding `initial` values.
    #[must_use]
    pub fn seeded(initial: BTreeMap<String, TopicValue>) -> Self {
        let store = Self::new();
        for (topic, value) in initial {
            store.topics.insert(topic, watch::channel(Some(value)).0);
        }
        debug!(topics = store.topics.len(), "Seeded topic store");
        store
    }

    /// Apply one inbound message.
    ///
    /// `raw_payload` is JSON text. A malformed payload or topic leaves the
    /// previous value in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic is invalid or the payload is not JSON.
    pub fn apply_message(
        &self,
        topic: &str,
        raw_payload: &str,
        retain: bool,
        now: u64,
    ) -> Result<Applied, DecodeError> {
        if let Err(reason) = validate_topic(topic) {
            warn!(topic = %topic, reason, "Dropping update for invalid topic");
            return Err(DecodeError::InvalidTopic {
                topic: topic.to_string(),
                reason,
            });
        }

        let payload: Value = match serde_json::from_str(raw_payload) {
            Ok(payload) => payload,
            Err(source) => {
                warn!(topic = %topic, error = %source, "Dropping malformed payload");
                return Err(DecodeError::Payload {
                    topic: topic.to_string(),
                    source,
                });
            }
        };

        Ok(self.store_value(topic, TopicValue::new(payload, retain, now)))
    }

    fn store_value(&self, topic: &str, value: TopicValue) -> Applied {
        if let Some(slot) = self.topics.get(topic) {
            return self.replace(topic, &slot, value);
        }
        let slot = self.topics.entry(topic.to_string()).or_insert_with(empty_slot);
        self.replace(topic, &slot, value)
    }

    fn replace(&self, topic: &str, slot: &Slot, value: TopicValue) -> Applied {
        let modified = slot.send_if_modified(move |current| {
            if current.as_ref() == Some(&value) {
                return false;
            }
            *current = Some(value);
            true
        });

        if modified {
            self.bump();
            trace!(topic = %topic, watchers = slot.receiver_count(), "Applied update");
            Applied::Changed
        } else {
            trace!(topic = %topic, "Update unchanged");
            Applied::Unchanged
        }
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision = revision.wrapping_add(1));
    }

    /// Current value of a topic.
    #[must_use]
    pub fn get(&self, topic: &str) -> Option<TopicValue> {
        let slot = self.topics.get(topic)?;
        let value = slot.borrow().clone();
        value
    }

    /// Whether a topic holds a value.
    #[must_use]
    pub fn contains(&self, topic: &str) -> bool {
        let Some(slot) = self.topics.get(topic) else {
            return false;
        };
        let populated = slot.borrow().is_some();
        populated
    }

    /// Every populated topic and the connectivity flag.
    #[must_use]
    pub fn snapshot(&self) -> TopicSnapshot {
        let topics = self
            .topics
            .iter()
            .filter_map(|entry| {
                let value = entry.value().borrow().clone()?;
                Some((entry.key().clone(), value))
            })
            .collect();

        TopicSnapshot {
            connected: self.is_connected(),
            topics,
        }
    }

    /// Set transport connectivity.
    ///
    /// Topic values are left untouched. Returns `true` if the flag changed.
    pub fn set_connected(&self, connected: bool) -> bool {
        let modified = self.connected.send_if_modified(|current| {
            if *current == connected {
                return false;
            }
            *current = connected;
            true
        });
        if modified {
            self.bump();
            debug!(connected, "Connectivity changed");
        }
        modified
    }

    /// Transport connectivity.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Watch one topic and the connectivity flag.
    ///
    /// Watching does not make the topic appear in snapshots.
    #[must_use]
    pub fn watch(&self, topic: &str) -> TopicWatch {
        let value = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(empty_slot)
            .subscribe();

        TopicWatch::new(topic, value, self.connected.subscribe())
    }

    /// Watch the store-wide change counter.
    #[must_use]
    pub fn watch_revision(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Current store-wide change counter.
    #[must_use]
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Drop the slot of a topic that has neither a value nor watchers.
    pub fn release(&self, topic: &str) {
        let removed = self
            .topics
            .remove_if(topic, |_, slot| {
                slot.borrow().is_none() && slot.receiver_count() == 0
            })
            .is_some();
        if removed {
            trace!(topic = %topic, "Released empty topic slot");
        }
    }

    /// Get store statistics.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            topic_count: 0,
            watched_topics: 0,
            watchers: 0,
        };
        for entry in self.topics.iter() {
            let slot = entry.value();
            if slot.borrow().is_some() {
                stats.topic_count += 1;
            }
            let watchers = slot.receiver_count();
            if watchers > 0 {
                stats.watched_topics += 1;
                stats.watchers += watchers;
            }
        }
        stats
    }
}

impl Default for TopicStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::{derive, EntityConfig, FeatureMap};
    use serde_json::json;

    #[test]
    fn test_apply_and_get() {
        let store = TopicStore::new();
        assert!(store.get("tacos").is_none());

        let applied = store
            .apply_message("tacos", r#"{"yes":true}"#, false, 10)
            .unwrap();
        assert_eq!(applied, Applied::Changed);
        assert_eq!(
            store.get("tacos"),
            Some(TopicValue::new(json!({"yes": true}), false, 10))
        );
    }

    #[test]
    fn test_payload_shapes() {
        let store = TopicStore::new();
        store.apply_message("a", "1.5", false, 1).unwrap();
        store.apply_message("b", "[1,2]", true, 1).unwrap();
        store.apply_message("c", "null", false, 1).unwrap();
        store.apply_message("d", "\"OFF\"", false, 1).unwrap();

        assert_eq!(store.get("a").unwrap().payload, json!(1.5));
        assert_eq!(store.get("b").unwrap().payload, json!([1, 2]));
        assert!(store.get("b").unwrap().retain);
        assert_eq!(store.get("c").unwrap().payload, Value::Null);
        assert_eq!(store.get("d").unwrap().payload_str(), Some("OFF"));
    }

    #[test]
    fn test_malformed_payload_keeps_previous_value() {
        let store = TopicStore::new();
        store.apply_message("stats", r#"{"cpu":1}"#, false, 1).unwrap();

        let result = store.apply_message("stats", "{cpu:", false, 2);
        assert!(matches!(result, Err(DecodeError::Payload { .. })));
        assert_eq!(
            store.get("stats"),
            Some(TopicValue::new(json!({"cpu": 1}), false, 1))
        );

        assert!(store.apply_message("fresh", "ON", false, 3).is_err());
        assert!(!store.contains("fresh"));
        assert!(store.snapshot().get("fresh").is_none());
    }

    #[test]
    fn test_reserved_topic_is_rejected() {
        let store = TopicStore::new();
        let result = store.apply_message("__connected", "true", false, 1);
        assert!(matches!(result, Err(DecodeError::InvalidTopic { .. })));
        assert!(!store.is_connected());
    }

    #[test]
    fn test_same_message_twice_is_idempotent() {
        let store = TopicStore::new();
        assert_eq!(
            store.apply_message("t", "5", false, 1).unwrap(),
            Applied::Changed
        );
        let revision = store.revision();
        assert_eq!(
            store.apply_message("t", "5", false, 1).unwrap(),
            Applied::Unchanged
        );
        assert_eq!(store.revision(), revision);

        assert_eq!(
            store.apply_message("t", "5", false, 2).unwrap(),
            Applied::Changed
        );
        assert_eq!(store.get("t"), Some(TopicValue::new(5, false, 2)));
    }

    #[test]
    fn test_seeded_from_bootstrap() {
        let entities = EntityConfig::new().with_entity(
            "front",
            [("detect", true), ("record", false), ("snapshots", true)],
        );
        let store = TopicStore::seeded(derive(&entities, &FeatureMap::default(), 123_456).unwrap());

        assert_eq!(
            store.get("front/detect/state"),
            Some(TopicValue::new("ON", false, 123_456))
        );
        assert_eq!(store.snapshot().len(), 3);
        assert!(!store.snapshot().connected);
    }

    #[test]
    fn test_connectivity_preserves_values() {
        let store = TopicStore::new();
        store.apply_message("t", "1", true, 1).unwrap();

        assert!(store.set_connected(true));
        assert!(!store.set_connected(true));
        assert!(store.is_connected());

        assert!(store.set_connected(false));
        assert_eq!(store.get("t"), Some(TopicValue::new(1, true, 1)));
        assert!(!store.snapshot().connected);
    }

    #[test]
    fn test_watch_does_not_populate_snapshot() {
        let store = TopicStore::new();
        let watch = store.watch("later");
        assert!(watch.value().is_none());
        assert!(store.snapshot().is_empty());
        assert_eq!(store.stats().watched_topics, 1);

        drop(watch);
        store.release("later");
        assert_eq!(
            store.stats(),
            StoreStats {
                topic_count: 0,
                watched_topics: 0,
                watchers: 0
            }
        );
    }

    #[test]
    fn test_release_keeps_populated_topics() {
        let store = TopicStore::new();
        store.apply_message("t", "1", false, 1).unwrap();
        let watch = store.watch("t");
        drop(watch);

        store.release("t");
        assert!(store.contains("t"));
    }

    #[tokio::test]
    async fn test_update_wakes_only_its_topic() {
        let store = TopicStore::new();
        let mut a = store.watch("a");
        let b = store.watch("b");

        store.apply_message("a", "1", false, 1).unwrap();

        a.changed().await.unwrap();
        assert_eq!(a.value().unwrap().payload, json!(1));
        assert!(!b.has_changed());
        assert!(b.value().is_none());
    }

    #[tokio::test]
    async fn test_revision_tracks_changes() {
        let store = TopicStore::new();
        let mut revision = store.watch_revision();

        store.apply_message("a", "1", false, 1).unwrap();
        revision.changed().await.unwrap();
        assert_eq!(*revision.borrow_and_update(), 1);

        store.set_connected(true);
        revision.changed().await.unwrap();
        assert_eq!(*revision.borrow_and_update(), 2);
    }
}
