//! # relay-protocol
//!
//! Wire format definitions for the relay topic mirror.
//!
//! Every frame exchanged with the broker bridge is a single JSON text frame
//! carrying an [`Envelope`]. The envelope's `payload` is itself JSON text, so
//! a payload is encoded twice on the way out and decoded twice on the way in.
//!
//! ## Example
//!
//! ```rust
//! use relay_protocol::{codec, Envelope};
//!
//! let envelope = Envelope::publish("front/detect/set", &"ON", false).unwrap();
//! let text = codec::encode(&envelope).unwrap();
//! assert_eq!(text, r#"{"topic":"front/detect/set","payload":"\"ON\"","retain":false}"#);
//!
//! let decoded = codec::decode(&text).unwrap();
//! assert_eq!(decoded, envelope);
//! ```

pub mod codec;
pub mod envelope;
pub mod topic;

pub use codec::{decode, encode, ProtocolError};
pub use envelope::Envelope;
pub use topic::{validate_topic, CONNECTED_KEY};
