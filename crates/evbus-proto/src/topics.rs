//! Topic identity for published events.
//!
//! Topic structure: `{event_name}:v{event_version}\x01{event_key}`
//!
//! The topic prefix is fixed per publisher; the event key is appended per
//! event so subscribers can filter on `name:vN\x01` (all keys) or on the full
//! `name:vN\x01key\x00` (one key).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separates the combined topic from the payload bytes.
pub const TOPIC_PAYLOAD_DELIMITER: u8 = 0x00;

/// Terminates the topic prefix; the event key follows it directly.
pub const PREFIX_KEY_DELIMITER: u8 = 0x01;

/// Marker between the event name and the decimal version.
pub const VERSION_MARKER: &str = ":v";

/// Identifier of an event type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventName(String);

impl EventName {
    /// Create an event name.
    ///
    /// # Errors
    ///
    /// Returns error if the name is empty or contains a frame delimiter byte.
    pub fn new(name: impl Into<String>) -> Result<Self, TopicError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TopicError::InvalidEventName(
                "event name must not be empty".to_string(),
            ));
        }
        if contains_delimiter(name.as_bytes()) {
            return Err(TopicError::InvalidEventName(format!(
                "{name:?} contains a reserved delimiter byte"
            )));
        }
        Ok(Self(name))
    }

    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EventName {
    type Error = TopicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EventName> for String {
    fn from(value: EventName) -> Self {
        value.0
    }
}

/// Schema revision of an event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventVersion(pub u32);

impl fmt::Display for EventVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for EventVersion {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Application-chosen routing key for a single event.
///
/// May be empty and may hold any bytes except `0x00`
/// ([`TOPIC_PAYLOAD_DELIMITER`]). Keys containing `0x00` are rejected by
/// [`EventKey::new`]: a subscriber splits the topic from the payload at the
/// first `0x00` after the prefix, so such a key would move part of itself into
/// the payload of every frame it is sent with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EventKey(Vec<u8>);

impl EventKey {
    /// Create an event key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the key contains the topic/payload delimiter.
    pub fn new(key: impl Into<Vec<u8>>) -> Result<Self, TopicError> {
        let key = key.into();
        if key.contains(&TOPIC_PAYLOAD_DELIMITER) {
            return Err(TopicError::InvalidEventKey(format!(
                "{} contains the topic/payload delimiter",
                String::from_utf8_lossy(&key)
            )));
        }
        Ok(Self(key))
    }

    /// The empty key.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether the key is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<&str> for EventKey {
    type Error = TopicError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value.as_bytes())
    }
}

/// Fixed topic prefix `{name}:v{version}\x01` for one publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPrefix {
    bytes: Vec<u8>,
}

impl TopicPrefix {
    /// Build the topic prefix for an event type.
    #[must_use]
    pub fn new(name: &EventName, version: EventVersion) -> Self {
        let mut bytes = format!("{name}{VERSION_MARKER}{version}").into_bytes();
        bytes.push(PREFIX_KEY_DELIMITER);
        Self { bytes }
    }

    /// Raw prefix bytes, including the trailing delimiter.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Full topic for a key: the prefix followed by the key bytes.
    #[must_use]
    pub fn topic(&self, key: &EventKey) -> Vec<u8> {
        let mut topic = Vec::with_capacity(self.bytes.len() + key.as_bytes().len());
        topic.extend_from_slice(&self.bytes);
        topic.extend_from_slice(key.as_bytes());
        topic
    }

    /// Parse a prefix back into its event type.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a well-formed topic prefix.
    pub fn parse(bytes: &[u8]) -> Result<(EventName, EventVersion), TopicError> {
        let Some((&PREFIX_KEY_DELIMITER, body)) = bytes.split_last() else {
            return Err(TopicError::MalformedFrame(
                "topic prefix is not terminated by the prefix/key delimiter".to_string(),
            ));
        };

        let body = std::str::from_utf8(body)
            .map_err(|e| TopicError::MalformedFrame(format!("topic prefix is not UTF-8: {e}")))?;

        let (name, version) = body.rsplit_once(VERSION_MARKER).ok_or_else(|| {
            TopicError::MalformedFrame(format!("{body:?} has no version marker"))
        })?;

        if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TopicError::MalformedFrame(format!(
                "{body:?} has an invalid version"
            )));
        }
        let version = version
            .parse::<u32>()
            .map_err(|e| TopicError::MalformedFrame(format!("{body:?}: {e}")))?;

        Ok((EventName::new(name)?, EventVersion(version)))
    }
}

impl fmt::Display for TopicPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.bytes).escape_debug())
    }
}

fn contains_delimiter(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .any(|&b| b == TOPIC_PAYLOAD_DELIMITER || b == PREFIX_KEY_DELIMITER)
}

/// Errors for topic construction and frame decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    /// Event name is empty or contains a reserved byte
    #[error("invalid event name: {0}")]
    InvalidEventName(String),
    /// Event key contains the topic/payload delimiter
    #[error("invalid event key: {0}")]
    InvalidEventKey(String),
    /// Bytes are not a well-formed frame
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}
