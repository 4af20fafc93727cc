//! `SQLite`-backed registry.

use crate::{PublisherEntry, PublisherRecord, Registration, Registry, RegistryError};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use evbus_proto::{EventName, EventVersion};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Registry persisted in a `SQLite` database; clones share the connection.
#[derive(Clone)]
pub struct SqliteRegistry {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRegistry {
    /// Open or create a registry database.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or initialized.
    pub fn open(path: &Path) -> Result<Self, RegistryError> {
        let conn = Connection::open(path).map_err(storage)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be created.
    pub fn in_memory() -> Result<Self, RegistryError> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, RegistryError> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS publishers (
                id TEXT PRIMARY KEY,
                event_name TEXT NOT NULL,
                event_version INTEGER NOT NULL,
                host TEXT NOT NULL,
                port INTEGER NOT NULL,
                registered_at INTEGER NOT NULL,
                UNIQUE(event_name, event_version, host, port)
            );

            CREATE INDEX IF NOT EXISTS idx_publishers_event
                ON publishers(event_name, event_version);
            ",
        )
        .map_err(storage)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Live publishers of one event type, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn publishers(
        &self,
        event_name: &EventName,
        event_version: EventVersion,
    ) -> Result<Vec<PublisherRecord>, RegistryError> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn
            .prepare(
                r"
                SELECT id, event_name, event_version, host, port, registered_at
                FROM publishers
                WHERE event_name = ?1 AND event_version = ?2
                ORDER BY registered_at ASC
                ",
            )
            .map_err(storage)?;

        let records = stmt
            .query_map((event_name.as_str(), event_version.0), read_record)
            .map_err(storage)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage)?;

        Ok(records)
    }

    /// Number of live registrations.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub fn len(&self) -> Result<usize, RegistryError> {
        let count: i64 = lock(&self.conn)?
            .query_row("SELECT COUNT(*) FROM publishers", [], |row| row.get(0))
            .map_err(storage)?;
        usize::try_from(count).map_err(|e| RegistryError::Storage(e.to_string()))
    }
}

#[async_trait]
impl Registry for SqliteRegistry {
    async fn register(
        &self,
        entry: &PublisherEntry,
    ) -> Result<Box<dyn Registration>, RegistryError> {
        let id = Uuid::new_v4();
        let registered_at = Utc::now().timestamp_millis();

        lock(&self.conn)?
            .execute(
                r"
                INSERT INTO publishers (id, event_name, event_version, host, port, registered_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
                (
                    id.to_string(),
                    entry.event_name.as_str(),
                    entry.event_version.0,
                    entry.host.as_str(),
                    entry.port,
                    registered_at,
                ),
            )
            .map_err(|e| match e.sqlite_error_code() {
                Some(ErrorCode::ConstraintViolation) => RegistryError::Duplicate(entry.to_string()),
                _ => storage(e),
            })?;

        tracing::info!(%id, %entry, "Publisher registered");

        Ok(Box::new(SqliteRegistration {
            id,
            conn: Arc::clone(&self.conn),
            unregistered: false,
        }))
    }
}

struct SqliteRegistration {
    id: Uuid,
    conn: Arc<Mutex<Connection>>,
    unregistered: bool,
}

#[async_trait]
impl Registration for SqliteRegistration {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn unregister(&mut self) -> Result<(), RegistryError> {
        if self.unregistered {
            return Err(RegistryError::AlreadyUnregistered(self.id));
        }

        let deleted = lock(&self.conn)?
            .execute("DELETE FROM publishers WHERE id = ?1", [self.id.to_string()])
            .map_err(storage)?;
        if deleted == 0 {
            return Err(RegistryError::NotFound(self.id));
        }
        self.unregistered = true;

        tracing::info!(id = %self.id, "Publisher unregistered");
        Ok(())
    }
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<PublisherRecord> {
    let id: String = row.get(0)?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;

    let event_name: String = row.get(1)?;
    let event_name = EventName::new(event_name)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

    let registered_at: i64 = row.get(5)?;
    let registered_at = Utc
        .timestamp_millis_opt(registered_at)
        .single()
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(5, registered_at))?;

    Ok(PublisherRecord {
        id,
        entry: PublisherEntry {
            event_name,
            event_version: EventVersion(row.get(2)?),
            host: row.get(3)?,
            port: row.get(4)?,
        },
        registered_at,
    })
}

fn lock(conn: &Arc<Mutex<Connection>>) -> Result<MutexGuard<'_, Connection>, RegistryError> {
    conn.lock()
        .map_err(|e| RegistryError::Storage(format!("registry lock poisoned: {e}")))
}

#[allow(clippy::needless_pass_by_value)]
fn storage(e: rusqlite::Error) -> RegistryError {
    RegistryError::Storage(e.to_string())
}
