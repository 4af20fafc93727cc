//! # evbus Transport
//!
//! Publish-mode socket capability and a TCP implementation of it.
//!
//! A [`PubContext`] creates [`PubSocket`]s; a socket is bound once, sends
//! whole messages to every connected subscriber, and is closed before the
//! context may be terminated. Delivery is at-most-once: messages sent while
//! no subscriber is connected are discarded, and a subscriber that falls too
//! far behind is disconnected instead of slowing down the sender.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod endpoint;
pub mod socket;
pub mod tcp;

pub use endpoint::Endpoint;
pub use socket::{PubContext, PubSocket};
pub use tcp::{TcpContext, TcpPubSocket, DEFAULT_QUEUE_CAPACITY};

/// Errors for transport operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Endpoint could not be parsed
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// Bind failed
    #[error("bind error: {0}")]
    Bind(String),
    /// Socket is already bound
    #[error("socket is already bound")]
    AlreadyBound,
    /// Socket has not been bound
    #[error("socket is not bound")]
    NotBound,
    /// Socket has been closed
    #[error("socket is closed")]
    Closed,
    /// Message exceeds the stream length prefix
    #[error("frame of {0} bytes is too large")]
    FrameTooLarge(usize),
    /// Context still owns open sockets
    #[error("{0} socket(s) still open")]
    SocketsOpen(usize),
    /// Context has been terminated
    #[error("context is terminated")]
    Terminated,
    /// Other I/O failure
    #[error("I/O error: {0}")]
    Io(String),
}
