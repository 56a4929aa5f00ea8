//! The envelope carried by every frame.
//!
//! An envelope names a topic, carries a JSON-encoded payload string, and the
//! broker retain flag.

use serde::{Deserialize, Serialize};

use crate::codec::ProtocolError;

/// A single publish, in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Target topic.
    pub topic: String,
    /// JSON text of the payload.
    pub payload: String,
    /// Broker retain flag.
    #[serde(default)]
    pub retain: bool,
}

impl Envelope {
    /// Create an envelope from an already JSON-encoded payload.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<String>, retain: bool) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain,
        }
    }

    /// Create an envelope by JSON-encoding `payload`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn publish<T>(topic: impl Into<String>, payload: &T, retain: bool) -> Result<Self, ProtocolError>
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_string(payload).map_err(ProtocolError::Payload)?;
        Ok(Self::new(topic, payload, retain))
    }

    /// Decode the inner payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload string is not valid JSON.
    pub fn decode_payload(&self) -> Result<serde_json::Value, ProtocolError> {
        serde_json::from_str(&self.payload).map_err(ProtocolError::Payload)
    }

    /// Size of the inner payload in bytes.
    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_publish_double_encodes() {
        let envelope = Envelope::publish("tacos", &json!({"yes": true}), false).unwrap();
        assert_eq!(envelope.payload, r#"{"yes":true}"#);
        assert_eq!(envelope.decode_payload().unwrap(), json!({"yes": true}));
    }

    #[test]
    fn test_publish_primitives() {
        let envelope = Envelope::publish("front/detect/set", "ON", true).unwrap();
        assert_eq!(envelope.payload, "\"ON\"");
        assert!(envelope.retain);

        let envelope = Envelope::publish("count", &42, false).unwrap();
        assert_eq!(envelope.decode_payload().unwrap(), json!(42));
    }

    #[test]
    fn test_decode_payload_rejects_plain_text() {
        let envelope = Envelope::new("tacos", "not json", false);
        assert!(matches!(
            envelope.decode_payload(),
            Err(ProtocolError::Payload(_))
        ));
    }
}
