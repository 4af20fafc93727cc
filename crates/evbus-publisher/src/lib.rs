//! # evbus Publisher
//!
//! Typed publisher for the evbus event bus.
//!
//! A [`Publisher`] serves one event type `(name, version)`:
//!
//! 1. [`Publisher::create`] binds a publish socket and registers the endpoint
//!    in the discovery registry
//! 2. [`Publisher::publish`] frames each event of a batch and sends it
//! 3. [`Publisher::stop`] unregisters, closes the socket and terminates the
//!    transport context, in that order
//!
//! `publish` and `stop` take `&mut self`; a publisher is never used from two
//! tasks at once without the owner serializing access.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod publisher;

pub use error::PublisherError;
pub use publisher::{Lifecycle, Publisher};

pub use evbus_proto::{Cbor, Event, EventKey, EventName, EventVersion, Marshal, Proto};
pub use evbus_registry::{MemoryRegistry, Registry, SqliteRegistry};
pub use evbus_transport::{Endpoint, TcpContext};
