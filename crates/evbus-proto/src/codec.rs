//! Payload codecs.
//!
//! A payload type becomes publishable by implementing [`Marshal`]. Two
//! wrappers cover the usual cases: [`Cbor`] for `serde` types and [`Proto`]
//! for `prost` messages.

use serde::Serialize;

/// Serialize a payload into opaque bytes.
pub trait Marshal {
    /// Encode the payload.
    ///
    /// # Errors
    ///
    /// Returns error if the payload cannot be serialized.
    fn marshal(&self) -> Result<Vec<u8>, CodecError>;
}

impl Marshal for Vec<u8> {
    fn marshal(&self) -> Result<Vec<u8>, CodecError> {
        Ok(self.clone())
    }
}

/// CBOR-encoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Cbor<T>(pub T);

impl<T: Serialize> Marshal for Cbor<T> {
    fn marshal(&self) -> Result<Vec<u8>, CodecError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(&self.0, &mut bytes)
            .map_err(|e| CodecError::Serialize(e.to_string()))?;
        Ok(bytes)
    }
}

/// Protobuf-encoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Proto<T>(pub T);

impl<T: prost::Message> Marshal for Proto<T> {
    fn marshal(&self) -> Result<Vec<u8>, CodecError> {
        Ok(self.0.encode_to_vec())
    }
}

/// Errors for payload serialization.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CodecError {
    /// Serialization failed
    #[error("serialization failed: {0}")]
    Serialize(String),
}
