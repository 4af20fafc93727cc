//! Event frames.
//!
//! Frame structure: `{topic_prefix}{event_key}\x00{payload}`

use crate::codec::{CodecError, Marshal};
use crate::topics::{
    EventKey, EventName, EventVersion, TopicError, TopicPrefix, PREFIX_KEY_DELIMITER,
    TOPIC_PAYLOAD_DELIMITER,
};

/// A single event to publish.
#[derive(Debug, Clone, PartialEq)]
pub struct Event<P> {
    /// Routing key
    pub key: EventKey,
    /// Typed payload
    pub payload: P,
}

impl<P> Event<P> {
    /// Create an event.
    #[must_use]
    pub fn new(key: EventKey, payload: P) -> Self {
        Self { key, payload }
    }

    /// Create an event with the empty key.
    #[must_use]
    pub fn unkeyed(payload: P) -> Self {
        Self {
            key: EventKey::empty(),
            payload,
        }
    }
}

/// Encode one event into frame bytes under a fixed topic prefix.
///
/// # Errors
///
/// Returns error if the payload cannot be serialized.
pub fn encode_frame<P: Marshal>(
    prefix: &TopicPrefix,
    event: &Event<P>,
) -> Result<Vec<u8>, CodecError> {
    let payload = event.payload.marshal()?;

    let prefix = prefix.as_bytes();
    let key = event.key.as_bytes();
    let mut frame = Vec::with_capacity(prefix.len() + key.len() + 1 + payload.len());
    frame.extend_from_slice(prefix);
    frame.extend_from_slice(key);
    frame.push(TOPIC_PAYLOAD_DELIMITER);
    frame.extend_from_slice(&payload);

    Ok(frame)
}

/// A frame split back into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Event type name
    pub event_name: EventName,
    /// Event type version
    pub event_version: EventVersion,
    /// Routing key bytes
    pub key: Vec<u8>,
    /// Serialized payload bytes
    pub payload: Vec<u8>,
}

impl DecodedFrame {
    /// Length of the topic (prefix plus key) within the original frame.
    #[must_use]
    pub fn topic_len(&self) -> usize {
        TopicPrefix::new(&self.event_name, self.event_version)
            .as_bytes()
            .len()
            + self.key.len()
    }
}

/// Split frame bytes into event type, key and payload.
///
/// The prefix ends at the first `0x01`; the key runs up to the first `0x00`
/// after it. Everything after that is payload, whatever bytes it contains.
///
/// # Errors
///
/// Returns error if the bytes are not a well-formed frame.
pub fn decode_frame(frame: &[u8]) -> Result<DecodedFrame, TopicError> {
    let prefix_end = frame
        .iter()
        .position(|&b| b == PREFIX_KEY_DELIMITER)
        .ok_or_else(|| TopicError::MalformedFrame("missing prefix/key delimiter".to_string()))?;

    let (event_name, event_version) = TopicPrefix::parse(&frame[..=prefix_end])?;

    let rest = &frame[prefix_end + 1..];
    let key_end = rest
        .iter()
        .position(|&b| b == TOPIC_PAYLOAD_DELIMITER)
        .ok_or_else(|| TopicError::MalformedFrame("missing topic/payload delimiter".to_string()))?;

    Ok(DecodedFrame {
        event_name,
        event_version,
        key: rest[..key_end].to_vec(),
        payload: rest[key_end + 1..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Cbor;
    use proptest::prelude::*;

    fn orders_v2() -> TopicPrefix {
        TopicPrefix::new(&EventName::new("orders").unwrap(), EventVersion(2))
    }

    struct Unserializable;

    impl Marshal for Unserializable {
        fn marshal(&self) -> Result<Vec<u8>, CodecError> {
            Err(CodecError::Serialize("boom".to_string()))
        }
    }

    #[test]
    fn frame_layout() {
        let event = Event::new(EventKey::try_from("k1").unwrap(), vec![0xAA, 0xBB]);

        let frame = encode_frame(&orders_v2(), &event).unwrap();

        assert_eq!(frame, b"orders:v2\x01k1\x00\xAA\xBB");
    }

    #[test]
    fn frame_with_empty_key() {
        let event = Event::unkeyed(vec![0x10]);

        let frame = encode_frame(&orders_v2(), &event).unwrap();

        assert_eq!(frame, b"orders:v2\x01\x00\x10");
    }

    #[test]
    fn frame_decomposes() {
        let prefix = orders_v2();
        let cases: [(&[u8], &[u8]); 5] = [
            (b"", b""),
            (b"k1", b"\xAA\xBB"),
            (b"", b"\x00\x00\x01"),
            (b"\x01key\x01", b"payload\x00with\x00nuls"),
            (b"tenant/42", &[0xFF; 64]),
        ];

        for (key, payload) in cases {
            let event = Event::new(EventKey::new(key).unwrap(), payload.to_vec());
            let frame = encode_frame(&prefix, &event).unwrap();

            let decoded = decode_frame(&frame).unwrap();
            let topic_len = decoded.topic_len();

            assert_eq!(decoded.event_name.as_str(), "orders");
            assert_eq!(decoded.event_version, EventVersion(2));
            assert_eq!(decoded.key, key);
            assert_eq!(decoded.payload, payload);
            assert_eq!(&frame[..topic_len], prefix.topic(&event.key).as_slice());
            assert_eq!(frame[topic_len], TOPIC_PAYLOAD_DELIMITER);
            assert_eq!(&frame[topic_len + 1..], payload);
        }
    }

    #[test]
    fn encoding_failure_propagates() {
        let event = Event::unkeyed(Unserializable);

        assert!(matches!(
            encode_frame(&orders_v2(), &event),
            Err(CodecError::Serialize(_))
        ));
    }

    #[test]
    fn cbor_frame() {
        let event = Event::unkeyed(Cbor("hello".to_string()));

        let frame = encode_frame(&orders_v2(), &event).unwrap();
        let decoded = decode_frame(&frame).unwrap();
        let text: String = ciborium::from_reader(decoded.payload.as_slice()).unwrap();

        assert_eq!(text, "hello");
    }

    #[test]
    fn decode_rejects_truncated() {
        assert!(decode_frame(b"orders:v2").is_err());
        assert!(decode_frame(b"orders:v2\x01k1").is_err());
        assert!(decode_frame(b"").is_err());
    }

    proptest! {
        #[test]
        fn any_frame_decomposes(
            version in any::<u32>(),
            key in proptest::collection::vec(1u8..=255, 0..32),
            payload in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            let name = EventName::new("orders").unwrap();
            let prefix = TopicPrefix::new(&name, EventVersion(version));
            let event = Event::new(EventKey::new(key.clone()).unwrap(), payload.clone());

            let frame = encode_frame(&prefix, &event).unwrap();
            let decoded = decode_frame(&frame).unwrap();
            let topic_len = decoded.topic_len();

            prop_assert_eq!(decoded.event_version, EventVersion(version));
            prop_assert_eq!(&decoded.key, &key);
            prop_assert_eq!(&decoded.payload, &payload);
            let expected_topic = prefix.topic(&event.key);
            prop_assert_eq!(&frame[..topic_len], expected_topic.as_slice());
            prop_assert_eq!(frame[topic_len], TOPIC_PAYLOAD_DELIMITER);
            prop_assert_eq!(&frame[topic_len + 1..], payload.as_slice());
        }
    }
}
