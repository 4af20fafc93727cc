//! Publish-mode socket capability.

use crate::{Endpoint, TransportError};
use async_trait::async_trait;

/// Owner of transport-wide resources that sockets are created from.
#[async_trait]
pub trait PubContext: Send {
    /// Socket type produced by this context.
    type Socket: PubSocket;

    /// Create a new, unbound publish-mode socket.
    ///
    /// # Errors
    ///
    /// Returns error if the context has been terminated.
    fn socket(&self) -> Result<Self::Socket, TransportError>;

    /// Release the context.
    ///
    /// # Errors
    ///
    /// Returns error if sockets created from this context are still open.
    async fn terminate(&mut self) -> Result<(), TransportError>;
}

/// One-to-many, send-only socket.
///
/// Not safe for concurrent use; every method takes `&mut self`.
#[async_trait]
pub trait PubSocket: Send {
    /// Bind to a local endpoint and start accepting subscribers.
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound.
    async fn bind(&mut self, endpoint: &Endpoint) -> Result<(), TransportError>;

    /// Send one message to every connected subscriber.
    ///
    /// # Errors
    ///
    /// Returns error if the socket is not bound or the message cannot be sent.
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Stop accepting subscribers and disconnect the current ones.
    ///
    /// # Errors
    ///
    /// Returns error if the socket is already closed.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Port actually bound, when the transport knows it (e.g. after binding
    /// port 0).
    fn local_port(&self) -> Option<u16> {
        None
    }
}
