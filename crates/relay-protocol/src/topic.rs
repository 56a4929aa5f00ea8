//! Topic name rules.

/// Maximum topic length in bytes, matching the broker limit.
pub const MAX_TOPIC_LENGTH: usize = 65_535;

/// Snapshot key reserved for the connectivity flag.
pub const CONNECTED_KEY: &str = "__connected";

/// Validate a concrete (non-wildcard) topic name.
///
/// # Errors
///
/// Returns an error message if the topic is invalid.
pub fn validate_topic(topic: &str) -> Result<(), &'static str> {
    if topic.is_empty() {
        return Err("Topic cannot be empty");
    }
    if topic.len() > MAX_TOPIC_LENGTH {
        return Err("Topic too long");
    }
    if topic == CONNECTED_KEY {
        return Err("Topic name is reserved");
    }
    if topic.contains(['+', '#']) {
        return Err("Topic cannot contain wildcards");
    }
    if topic.chars().any(|c| c == '\0' || c.is_control()) {
        return Err("Topic contains invalid characters");
    }
    Ok(())
}

/// Validate a single topic level (no separators).
///
/// # Errors
///
/// Returns an error message if the segment is invalid.
pub fn validate_segment(segment: &str) -> Result<(), &'static str> {
    if segment.contains('/') {
        return Err("Topic segment cannot contain '/'");
    }
    validate_topic(segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_validation() {
        assert!(validate_topic("front/detect/state").is_ok());
        assert!(validate_topic("stats").is_ok());
        assert!(validate_topic("").is_err());
        assert!(validate_topic(CONNECTED_KEY).is_err());
        assert!(validate_topic("front/+/state").is_err());
        assert!(validate_topic("front/#").is_err());
        assert!(validate_topic("bad\0topic").is_err());

        let long = "a".repeat(MAX_TOPIC_LENGTH + 1);
        assert!(validate_topic(&long).is_err());
    }

    #[test]
    fn test_segment_validation() {
        assert!(validate_segment("front").is_ok());
        assert!(validate_segment("front/door").is_err());
        assert!(validate_segment("").is_err());
    }
}
