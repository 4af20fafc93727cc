//! Registry capability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evbus_proto::{EventName, EventVersion};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Where a publisher of one event type can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublisherEntry {
    /// Event type name
    pub event_name: EventName,
    /// Event type version
    pub event_version: EventVersion,
    /// Advertised host
    pub host: String,
    /// Advertised port
    pub port: u16,
}

impl PublisherEntry {
    /// Create a new entry.
    #[must_use]
    pub fn new(
        event_name: EventName,
        event_version: EventVersion,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            event_name,
            event_version,
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for PublisherEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:v{}@{}:{}",
            self.event_name, self.event_version, self.host, self.port
        )
    }
}

/// A live registration as stored by a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherRecord {
    /// Registration identifier
    pub id: Uuid,
    /// Registered publisher
    pub entry: PublisherEntry,
    /// When the registration was made
    pub registered_at: DateTime<Utc>,
}

/// Discovery registry that publishers announce themselves to.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Register a publisher.
    ///
    /// The returned handle removes the registration again, exactly once.
    ///
    /// # Errors
    ///
    /// Returns error if the entry is already registered or storage fails.
    async fn register(&self, entry: &PublisherEntry)
        -> Result<Box<dyn Registration>, RegistryError>;
}

/// Single-use handle reversing one registration.
#[async_trait]
pub trait Registration: Send {
    /// Registration identifier.
    fn id(&self) -> Uuid;

    /// Remove the registration.
    ///
    /// A failed attempt may be retried; a successful one may not.
    ///
    /// # Errors
    ///
    /// Returns error if already unregistered, the registration is gone, or
    /// storage fails.
    async fn unregister(&mut self) -> Result<(), RegistryError>;
}

/// Errors for registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Same publisher is already registered
    #[error("publisher already registered: {0}")]
    Duplicate(String),
    /// Registration no longer exists
    #[error("registration not found: {0}")]
    NotFound(Uuid),
    /// Handle was already used
    #[error("registration already unregistered: {0}")]
    AlreadyUnregistered(Uuid),
    /// Backing store failed
    #[error("storage error: {0}")]
    Storage(String),
}
