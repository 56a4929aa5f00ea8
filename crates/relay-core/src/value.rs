//! Stored topic values and whole-store snapshots.

use relay_protocol::CONNECTED_KEY;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The last-known value of a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicValue {
    /// Decoded payload.
    pub payload: Value,
    /// Broker retain flag of the message that set this value.
    pub retain: bool,
    /// When the store set this value, in milliseconds since the epoch.
    #[serde(rename = "lastUpdate")]
    pub last_update: u64,
}

impl TopicValue {
    /// Create a new topic value.
    #[must_use]
    pub fn new(payload: impl Into<Value>, retain: bool, last_update: u64) -> Self {
        Self {
            payload: payload.into(),
            retain,
            last_update,
        }
    }

    /// The payload as a string, if it is one.
    #[must_use]
    pub fn payload_str(&self) -> Option<&str> {
        self.payload.as_str()
    }
}

/// Every populated topic at one point in time, plus connectivity.
///
/// Serializes as a flat object: one key per topic and `"__connected"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopicSnapshot {
    /// Transport connectivity.
    #[serde(rename = "__connected")]
    pub connected: bool,
    /// Topic values by name.
    #[serde(flatten)]
    pub topics: BTreeMap<String, TopicValue>,
}

impl TopicSnapshot {
    /// Look up a topic.
    #[must_use]
    pub fn get(&self, topic: &str) -> Option<&TopicValue> {
        self.topics.get(topic)
    }

    /// Number of populated topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Whether no topic is populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Topic names in order, including the reserved connectivity key.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        std::iter::once(CONNECTED_KEY)
            .chain(self.topics.keys().map(String::as_str))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_topic_value_wire_shape() {
        let value = TopicValue::new("ON", false, 123_456);
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            json!({"lastUpdate": 123_456, "payload": "ON", "retain": false})
        );
        assert_eq!(value.payload_str(), Some("ON"));
    }

    #[test]
    fn test_snapshot_serializes_flat() {
        let mut snapshot = TopicSnapshot {
            connected: true,
            ..Default::default()
        };
        snapshot
            .topics
            .insert("tacos".into(), TopicValue::new(json!({"yes": true}), true, 7));

        assert_eq!(
            serde_json::to_value(&snapshot).unwrap(),
            json!({
                "__connected": true,
                "tacos": {"payload": {"yes": true}, "retain": true, "lastUpdate": 7},
            })
        );
        assert_eq!(snapshot.keys(), vec!["__connected", "tacos"]);
    }
}
