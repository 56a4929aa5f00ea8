//! Codec for encoding and decoding envelopes.
//!
//! Frames are JSON text; one envelope per frame.

use thiserror::Error;

use crate::envelope::Envelope;
use crate::topic::validate_topic;

/// Maximum frame size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Envelope JSON error.
    #[error("Envelope error: {0}")]
    Envelope(#[source] serde_json::Error),

    /// Inner payload JSON error.
    #[error("Payload error: {0}")]
    Payload(#[source] serde_json::Error),

    /// Invalid topic name.
    #[error("Invalid topic: {0}")]
    InvalidTopic(&'static str),
}

/// Encode an envelope to a text frame.
///
/// # Errors
///
/// Returns an error if the topic is invalid, the frame is too large, or
/// serialization fails.
pub fn encode(envelope: &Envelope) -> Result<String, ProtocolError> {
    validate_topic(&envelope.topic).map_err(ProtocolError::InvalidTopic)?;

    let text = serde_json::to_string(envelope).map_err(ProtocolError::Envelope)?;

    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    Ok(text)
}

/// Decode an envelope from a text frame.
///
/// Only the outer layer is decoded; the payload stays JSON text.
///
/// # Errors
///
/// Returns an error if the frame is too large or is not an envelope.
pub fn decode(text: &str) -> Result<Envelope, ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    serde_json::from_str(text).map_err(ProtocolError::Envelope)
}
