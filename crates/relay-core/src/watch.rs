//! Per-topic change notification.

use thiserror::Error;
use tokio::sync::watch;

use crate::value::TopicValue;

/// The store backing a watch is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Topic store closed")]
pub struct WatchClosed;

/// Observes one topic and the connectivity flag.
///
/// Created by [`TopicStore::watch`](crate::TopicStore::watch). Updates to
/// other topics never wake it.
#[derive(Debug)]
pub struct TopicWatch {
    topic: String,
    value: watch::Receiver<Option<TopicValue>>,
    connected: watch::Receiver<bool>,
}

impl TopicWatch {
    pub(crate) fn new(
        topic: impl Into<String>,
        value: watch::Receiver<Option<TopicValue>>,
        connected: watch::Receiver<bool>,
    ) -> Self {
        Self {
            topic: topic.into(),
            value,
            connected,
        }
    }

    /// The watched topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Current value, if the topic has one.
    #[must_use]
    pub fn value(&self) -> Option<TopicValue> {
        self.value.borrow().clone()
    }

    /// Current connectivity.
    #[must_use]
    pub fn connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Whether a change arrived since the last [`changed`](Self::changed).
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.value.has_changed().unwrap_or(false) || self.connected.has_changed().unwrap_or(false)
    }

    /// Wait until the topic value or connectivity changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the store was dropped.
    pub async fn changed(&mut self) -> Result<(), WatchClosed> {
        tokio::select! {
            res = self.value.changed() => res.map_err(|_| WatchClosed),
            res = self.connected.changed() => res.map_err(|_| WatchClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::store::TopicStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_connectivity_wakes_every_watch() {
        let store = TopicStore::new();
        let mut a = store.watch("a");
        let mut b = store.watch("b");
        assert!(!a.connected());

        store.set_connected(true);

        a.changed().await.unwrap();
        b.changed().await.unwrap();
        assert!(a.connected());
        assert!(b.connected());
        assert_eq!(a.topic(), "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrelated_update_does_not_wake() {
        let store = TopicStore::new();
        let mut a = store.watch("a");

        store.apply_message("b", "1", false, 1).unwrap();

        let woke = tokio::time::timeout(Duration::from_secs(1), a.changed()).await;
        assert!(woke.is_err());
    }
}
