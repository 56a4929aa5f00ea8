//! Synthetic topics derived from entity configuration.
//!
//! Before the broker has sent anything, each configured entity already has a
//! known on/off state for its switchable features. Those are published into
//! the store as `<entity>/<segment>/state` topics so consumers see a value
//! immediately.

use relay_protocol::topic::validate_segment;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use tracing::debug;

use crate::value::TopicValue;

/// Payload of an enabled switch.
pub const ON: &str = "ON";

/// Payload of a disabled switch.
pub const OFF: &str = "OFF";

/// Configuration errors found while deriving bootstrap topics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstructionError {
    /// The configuration root is not an object.
    #[error("Entity configuration must be an object")]
    NotAnObject,

    /// Entity name cannot be used as a topic segment.
    #[error("Invalid entity name {name:?}: {reason}")]
    InvalidEntity {
        /// Offending name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Entity value is not an object.
    #[error("Entity {0:?} must be an object")]
    EntityNotObject(String),

    /// A recognized feature section is absent.
    #[error("Entity {entity:?} is missing feature {feature:?}")]
    MissingFeature {
        /// Entity name.
        entity: String,
        /// Feature key.
        feature: String,
    },

    /// A feature section has no boolean `enabled` flag.
    #[error("Entity {entity:?} feature {feature:?} needs a boolean `enabled` flag")]
    InvalidFlag {
        /// Entity name.
        entity: String,
        /// Feature key.
        feature: String,
    },

    /// A feature binding is unusable.
    #[error("Invalid feature binding {key:?} -> {topic:?}: {reason}")]
    InvalidBinding {
        /// Feature key.
        key: String,
        /// Topic segment.
        topic: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Two bindings share a key or a topic segment.
    #[error("Duplicate feature binding {0:?}")]
    DuplicateBinding(String),
}

/// Maps an internal feature key to the topic segment the broker uses for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureBinding {
    /// Section name in the entity configuration.
    pub key: String,
    /// Topic segment on the wire.
    pub topic: String,
}

impl FeatureBinding {
    /// Create a new binding.
    #[must_use]
    pub fn new(key: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            topic: topic.into(),
        }
    }

    /// `<entity>/<topic>/state`
    #[must_use]
    pub fn state_topic(&self, entity: &str) -> String {
        format!("{}/{}/state", entity, self.topic)
    }

    /// `<entity>/<topic>/set`
    #[must_use]
    pub fn command_topic(&self, entity: &str) -> String {
        format!("{}/{}/set", entity, self.topic)
    }
}

/// The ordered set of switchable features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureMap {
    bindings: Vec<FeatureBinding>,
}

impl Default for FeatureMap {
    fn default() -> Self {
        Self {
            bindings: vec![
                FeatureBinding::new("detect", "detect"),
                FeatureBinding::new("record", "recordings"),
                FeatureBinding::new("snapshots", "snapshots"),
            ],
        }
    }
}

impl FeatureMap {
    /// Create a validated feature map.
    ///
    /// # Errors
    ///
    /// Returns an error if a binding is invalid or duplicated.
    pub fn new(bindings: Vec<FeatureBinding>) -> Result<Self, ConstructionError> {
        let map = Self { bindings };
        map.validate()?;
        Ok(map)
    }

    /// Check every binding.
    ///
    /// # Errors
    ///
    /// Returns an error if a binding is invalid or duplicated.
    pub fn validate(&self) -> Result<(), ConstructionError> {
        let mut keys = HashSet::new();
        let mut topics = HashSet::new();

        for binding in &self.bindings {
            let invalid = |reason| ConstructionError::InvalidBinding {
                key: binding.key.clone(),
                topic: binding.topic.clone(),
                reason,
            };
            if binding.key.is_empty() {
                return Err(invalid("Feature key cannot be empty"));
            }
            validate_segment(&binding.topic).map_err(invalid)?;

            if !keys.insert(binding.key.as_str()) {
                return Err(ConstructionError::DuplicateBinding(binding.key.clone()));
            }
            if !topics.insert(binding.topic.as_str()) {
                return Err(ConstructionError::DuplicateBinding(binding.topic.clone()));
            }
        }
        Ok(())
    }

    /// Find the binding for a feature key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FeatureBinding> {
        self.bindings.iter().find(|b| b.key == key)
    }

    /// Iterate bindings in order.
    pub fn iter(&self) -> impl Iterator<Item = &FeatureBinding> {
        self.bindings.iter()
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether there are no bindings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Entities by name, each a record of feature sections.
///
/// Sections and fields that no binding names are carried but ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityConfig {
    entities: BTreeMap<String, Value>,
}

impl EntityConfig {
    /// Create an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an arbitrary JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not an object.
    pub fn from_value(value: Value) -> Result<Self, ConstructionError> {
        match value {
            Value::Object(map) => Ok(Self {
                entities: map.into_iter().collect(),
            }),
            _ => Err(ConstructionError::NotAnObject),
        }
    }

    /// Add an entity with `{ <key>: { enabled: <flag> } }` sections.
    #[must_use]
    pub fn with_entity<I, K>(mut self, name: impl Into<String>, flags: I) -> Self
    where
        I: IntoIterator<Item = (K, bool)>,
        K: Into<String>,
    {
        let sections: Map<String, Value> = flags
            .into_iter()
            .map(|(key, enabled)| {
                let mut section = Map::new();
                section.insert("enabled".into(), Value::Bool(enabled));
                (key.into(), Value::Object(section))
            })
            .collect();
        self.entities.insert(name.into(), Value::Object(sections));
        self
    }

    /// Entity names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Whether an entity is configured.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether no entity is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Payload for a switch state.
#[must_use]
pub fn switch_payload(enabled: bool) -> &'static str {
    if enabled {
        ON
    } else {
        OFF
    }
}

/// Read a switch state payload back.
#[must_use]
pub fn parse_switch(payload: &Value) -> Option<bool> {
    match payload.as_str()? {
        ON => Some(true),
        OFF => Some(false),
        _ => None,
    }
}

fn enabled_flag(
    entity: &str,
    sections: &Map<String, Value>,
    key: &str,
) -> Result<bool, ConstructionError> {
    let section = sections
        .get(key)
        .ok_or_else(|| ConstructionError::MissingFeature {
            entity: entity.to_string(),
            feature: key.to_string(),
        })?;

    section
        .get("enabled")
        .and_then(Value::as_bool)
        .ok_or_else(|| ConstructionError::InvalidFlag {
            entity: entity.to_string(),
            feature: key.to_string(),
        })
}

/// Derive the synthetic state topics for every entity and feature.
///
/// Each topic is `<entity>/<segment>/state` with payload `"ON"` or `"OFF"`,
/// `retain = false` and `last_update = now`.
///
/// # Errors
///
/// Returns an error if the feature map or any entity is malformed.
pub fn derive(
    entities: &EntityConfig,
    features: &FeatureMap,
    now: u64,
) -> Result<BTreeMap<String, TopicValue>, ConstructionError> {
    features.validate()?;

    let mut topics = BTreeMap::new();
    for (name, entity) in &entities.entities {
        validate_segment(name).map_err(|reason| ConstructionError::InvalidEntity {
            name: name.clone(),
            reason,
        })?;

        let sections = entity
            .as_object()
            .ok_or_else(|| ConstructionError::EntityNotObject(name.clone()))?;

        for binding in features.iter() {
            let enabled = enabled_flag(name, sections, &binding.key)?;
            topics.insert(
                binding.state_topic(name),
                TopicValue::new(switch_payload(enabled), false, now),
            );
        }
    }

    debug!(
        entities = entities.len(),
        topics = topics.len(),
        "Derived bootstrap topics"
    );
    Ok(topics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn front_and_side() -> EntityConfig {
        EntityConfig::from_value(json!({
            "front": {
                "name": "front",
                "detect": {"enabled": true},
                "record": {"enabled": false},
                "snapshots": {"enabled": true},
            },
            "side": {
                "name": "side",
                "detect": {"enabled": false},
                "record": {"enabled": false},
                "snapshots": {"enabled": false},
            },
        }))
        .unwrap()
    }

    #[test]
    fn test_derive_front_and_side() {
        let topics = derive(&front_and_side(), &FeatureMap::default(), 123_456).unwrap();
        assert_eq!(topics.len(), 6);

        let expect = |topic: &str, payload: &str| {
            assert_eq!(
                topics.get(topic),
                Some(&TopicValue::new(payload, false, 123_456)),
                "{topic}"
            );
        };
        expect("front/detect/state", "ON");
        expect("front/recordings/state", "OFF");
        expect("front/snapshots/state", "ON");
        expect("side/detect/state", "OFF");
        expect("side/recordings/state", "OFF");
        expect("side/snapshots/state", "OFF");

        assert!(!topics.contains_key("front/record/state"));
    }

    #[test]
    fn test_derive_empty() {
        let topics = derive(&EntityConfig::new(), &FeatureMap::default(), 1).unwrap();
        assert!(topics.is_empty());
    }

    #[test]
    fn test_custom_binding_is_used_verbatim() {
        let features = FeatureMap::new(vec![FeatureBinding::new("audio", "audio_detect")]).unwrap();
        let entities = EntityConfig::new().with_entity("porch", [("audio", true)]);

        let topics = derive(&entities, &features, 5).unwrap();
        assert_eq!(
            topics.get("porch/audio_detect/state").map(|v| v.payload.clone()),
            Some(json!("ON"))
        );
    }

    #[test]
    fn test_missing_feature_is_rejected() {
        let entities = EntityConfig::new().with_entity("front", [("detect", true)]);
        assert_eq!(
            derive(&entities, &FeatureMap::default(), 0),
            Err(ConstructionError::MissingFeature {
                entity: "front".into(),
                feature: "record".into(),
            })
        );
    }

    #[test]
    fn test_non_boolean_flag_is_rejected() {
        let entities = EntityConfig::from_value(json!({
            "front": {
                "detect": {"enabled": "yes"},
                "record": {"enabled": false},
                "snapshots": {"enabled": false},
            }
        }))
        .unwrap();
        assert!(matches!(
            derive(&entities, &FeatureMap::default(), 0),
            Err(ConstructionError::InvalidFlag { .. })
        ));
    }

    #[test]
    fn test_bad_shapes_are_rejected() {
        assert_eq!(
            EntityConfig::from_value(json!([1, 2])),
            Err(ConstructionError::NotAnObject)
        );

        let entities = EntityConfig::from_value(json!({"front": 3})).unwrap();
        assert_eq!(
            derive(&entities, &FeatureMap::default(), 0),
            Err(ConstructionError::EntityNotObject("front".into()))
        );

        let entities = EntityConfig::from_value(json!({"front/door": {}})).unwrap();
        assert!(matches!(
            derive(&entities, &FeatureMap::default(), 0),
            Err(ConstructionError::InvalidEntity { .. })
        ));
    }

    #[test]
    fn test_feature_map_validation() {
        assert!(FeatureMap::default().validate().is_ok());
        assert!(matches!(
            FeatureMap::new(vec![
                FeatureBinding::new("record", "recordings"),
                FeatureBinding::new("recordings", "recordings"),
            ]),
            Err(ConstructionError::DuplicateBinding(_))
        ));
        assert!(matches!(
            FeatureMap::new(vec![FeatureBinding::new("detect", "a/b")]),
            Err(ConstructionError::InvalidBinding { .. })
        ));
        assert!(matches!(
            FeatureMap::new(vec![FeatureBinding::new("", "detect")]),
            Err(ConstructionError::InvalidBinding { .. })
        ));
    }

    #[test]
    fn test_binding_topics() {
        let features = FeatureMap::default();
        let record = features.get("record").unwrap();
        assert_eq!(record.state_topic("front"), "front/recordings/state");
        assert_eq!(record.command_topic("front"), "front/recordings/set");
        assert!(features.get("motion").is_none());
    }

    #[test]
    fn test_switch_payloads() {
        assert_eq!(switch_payload(true), "ON");
        assert_eq!(switch_payload(false), "OFF");
        assert_eq!(parse_switch(&json!("ON")), Some(true));
        assert_eq!(parse_switch(&json!("OFF")), Some(false));
        assert_eq!(parse_switch(&json!(true)), None);
    }
}
