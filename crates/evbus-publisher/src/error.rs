//! Publisher errors.

use crate::Lifecycle;
use evbus_proto::CodecError;
use evbus_registry::RegistryError;
use evbus_transport::{Endpoint, TransportError};

/// Errors for publisher operations.
///
/// Every variant is terminal for the operation that produced it.
#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    /// The endpoint host cannot be advertised to subscribers
    #[error("{0} binds all interfaces and cannot be advertised; use a concrete host")]
    WildcardHost(Endpoint),
    /// The transport could not create a socket
    #[error("socket creation failed: {0}")]
    SocketCreate(#[source] TransportError),
    /// The socket could not be bound
    #[error("bind to {endpoint} failed: {source}")]
    Bind {
        /// Requested endpoint
        endpoint: Endpoint,
        /// Transport failure
        #[source]
        source: TransportError,
    },
    /// The registry rejected the publisher
    #[error("registration failed: {0}")]
    Registration(#[source] RegistryError),
    /// An event payload could not be serialized
    #[error("payload encoding failed for event {index}: {source}")]
    PayloadEncoding {
        /// Position of the event in the batch
        index: usize,
        /// Codec failure
        #[source]
        source: CodecError,
    },
    /// A frame could not be sent
    #[error("send failed for event {index}: {source}")]
    Send {
        /// Position of the event in the batch
        index: usize,
        /// Transport failure
        #[source]
        source: TransportError,
    },
    /// The registry entry could not be removed
    #[error("unregistration failed: {0}")]
    Unregistration(#[source] RegistryError),
    /// The socket could not be closed
    #[error("socket close failed: {0}")]
    SocketClose(#[source] TransportError),
    /// The transport context could not be terminated
    #[error("context termination failed: {0}")]
    ContextTermination(#[source] TransportError),
    /// Publish was called after stop began
    #[error("publisher is stopping or stopped (state: {0:?})")]
    Stopped(Lifecycle),
}

impl PublisherError {
    /// Batch position of the event that failed, for publish errors.
    #[must_use]
    pub fn event_index(&self) -> Option<usize> {
        match self {
            Self::PayloadEncoding { index, .. } | Self::Send { index, .. } => Some(*index),
            _ => None,
        }
    }
}
