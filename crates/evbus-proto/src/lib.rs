//! # evbus Protocol
//!
//! Topic framing and payload codecs for the evbus wire format.
//!
//! ## Frame
//!
//! ```text
//! frame        := topic_prefix || event_key || 0x00 || payload_bytes
//! topic_prefix := event_name || ":v" || decimal(event_version) || 0x01
//! ```
//!
//! Subscribers filter by byte prefix: `name:vN\x01` selects every key of an
//! event type, `name:vN\x01key\x00` selects one key.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod frame;
pub mod topics;

pub use codec::{Cbor, CodecError, Marshal, Proto};
pub use frame::{decode_frame, encode_frame, DecodedFrame, Event};
pub use topics::{EventKey, EventName, EventVersion, TopicError, TopicPrefix};
