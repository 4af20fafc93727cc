//! In-process registry.

use crate::{PublisherEntry, PublisherRecord, Registration, Registry, RegistryError};
use async_trait::async_trait;
use chrono::Utc;
use evbus_proto::{EventName, EventVersion};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

type Records = Arc<Mutex<HashMap<Uuid, PublisherRecord>>>;

/// Registry held in memory; clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    records: Records,
}

impl MemoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Live publishers of one event type, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the registry lock is poisoned.
    pub fn publishers(
        &self,
        event_name: &EventName,
        event_version: EventVersion,
    ) -> Result<Vec<PublisherRecord>, RegistryError> {
        let mut records: Vec<PublisherRecord> = lock(&self.records)?
            .values()
            .filter(|r| &r.entry.event_name == event_name && r.entry.event_version == event_version)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.registered_at);
        Ok(records)
    }

    /// Number of live registrations.
    ///
    /// # Errors
    ///
    /// Returns error if the registry lock is poisoned.
    pub fn len(&self) -> Result<usize, RegistryError> {
        Ok(lock(&self.records)?.len())
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn register(
        &self,
        entry: &PublisherEntry,
    ) -> Result<Box<dyn Registration>, RegistryError> {
        let mut records = lock(&self.records)?;
        if records.values().any(|r| &r.entry == entry) {
            return Err(RegistryError::Duplicate(entry.to_string()));
        }

        let id = Uuid::new_v4();
        records.insert(
            id,
            PublisherRecord {
                id,
                entry: entry.clone(),
                registered_at: Utc::now(),
            },
        );

        tracing::info!(%id, %entry, "Publisher registered");

        Ok(Box::new(MemoryRegistration {
            id,
            records: Arc::clone(&self.records),
            unregistered: false,
        }))
    }
}

struct MemoryRegistration {
    id: Uuid,
    records: Records,
    unregistered: bool,
}

#[async_trait]
impl Registration for MemoryRegistration {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn unregister(&mut self) -> Result<(), RegistryError> {
        if self.unregistered {
            return Err(RegistryError::AlreadyUnregistered(self.id));
        }

        let removed = lock(&self.records)?.remove(&self.id);
        let record = removed.ok_or(RegistryError::NotFound(self.id))?;
        self.unregistered = true;

        tracing::info!(id = %self.id, entry = %record.entry, "Publisher unregistered");
        Ok(())
    }
}

fn lock(records: &Records) -> Result<MutexGuard<'_, HashMap<Uuid, PublisherRecord>>, RegistryError> {
    records
        .lock()
        .map_err(|e| RegistryError::Storage(format!("registry lock poisoned: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, version: u32, port: u16) -> PublisherEntry {
        PublisherEntry::new(
            EventName::new(name).unwrap(),
            EventVersion(version),
            "127.0.0.1",
            port,
        )
    }

    #[tokio::test]
    async fn register_and_lookup() {
        let registry = MemoryRegistry::new();
        let orders = EventName::new("orders").unwrap();

        let _a = registry.register(&entry("orders", 2, 5555)).await.unwrap();
        let _b = registry.register(&entry("orders", 2, 5556)).await.unwrap();
        let _c = registry.register(&entry("orders", 3, 5557)).await.unwrap();

        let v2 = registry.publishers(&orders, EventVersion(2)).unwrap();
        let mut ports: Vec<u16> = v2.iter().map(|r| r.entry.port).collect();
        ports.sort_unstable();

        assert_eq!(ports, vec![5555, 5556]);
        assert_eq!(registry.len().unwrap(), 3);
    }

    #[tokio::test]
    async fn duplicate_is_rejected() {
        let registry = MemoryRegistry::new();
        let _first = registry.register(&entry("orders", 2, 5555)).await.unwrap();

        let second = registry.register(&entry("orders", 2, 5555)).await;

        assert!(matches!(second, Err(RegistryError::Duplicate(_))));
    }

    #[tokio::test]
    async fn unregister_is_single_use() {
        let registry = MemoryRegistry::new();
        let mut registration = registry.register(&entry("orders", 2, 5555)).await.unwrap();
        let id = registration.id();

        registration.unregister().await.unwrap();
        assert_eq!(registry.len().unwrap(), 0);

        assert_eq!(
            registration.unregister().await,
            Err(RegistryError::AlreadyUnregistered(id))
        );
    }

    #[tokio::test]
    async fn reregister_after_unregister() {
        let registry = MemoryRegistry::new();
        let mut first = registry.register(&entry("orders", 2, 5555)).await.unwrap();
        first.unregister().await.unwrap();

        let second = registry.register(&entry("orders", 2, 5555)).await.unwrap();

        assert_ne!(first.id(), second.id());
    }
}
