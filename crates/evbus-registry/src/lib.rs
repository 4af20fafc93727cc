//! # evbus Registry
//!
//! Discovery registry that publishers announce their endpoint to.
//!
//! Registering returns a [`Registration`] handle; calling
//! [`Registration::unregister`] removes the entry again and may succeed only
//! once. Two implementations are provided:
//!
//! - [`MemoryRegistry`]: in-process, for tests and single-process setups
//! - [`SqliteRegistry`]: persisted in a `SQLite` database shared by processes

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod registry;
pub mod sqlite;

pub use memory::MemoryRegistry;
pub use registry::{PublisherEntry, PublisherRecord, Registration, Registry, RegistryError};
pub use sqlite::SqliteRegistry;
