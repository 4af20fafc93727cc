//! Publish command configuration.

use anyhow::{bail, Context, Result};
use evbus_proto::{EventKey, EventName, EventVersion};
use evbus_transport::Endpoint;
use std::path::PathBuf;

/// Configuration for the `publish` command.
#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// Bind and advertised endpoint
    pub endpoint: Endpoint,

    /// Event type name
    pub event_name: EventName,

    /// Event type version
    pub event_version: EventVersion,

    /// Key applied to every published line
    pub event_key: EventKey,

    /// Registry configuration
    pub registry: RegistryConfig,
}

/// Registry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryConfig {
    /// In-process registry, visible to this process only
    Memory,
    /// `SQLite` registry at the given path
    Sqlite(PathBuf),
}

impl PublishConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `EVBUS_ENDPOINT`: `tcp://host:port` or `host:port`, overrides host and port
    /// - `EVBUS_HOST`: Bind/advertised host, not a wildcard (default `127.0.0.1`)
    /// - `EVBUS_PORT`: Bind port (default `5555`)
    /// - `EVBUS_EVENT_NAME`: Event name (required)
    /// - `EVBUS_EVENT_VERSION`: Event version (default `1`)
    /// - `EVBUS_EVENT_KEY`: Event key (default empty)
    /// - `EVBUS_REGISTRY`: `memory` or `sqlite` (default `memory`)
    /// - `EVBUS_REGISTRY_PATH`: `SQLite` path (default `./evbus-registry.db`)
    ///
    /// # Errors
    ///
    /// Returns error if a variable is missing or invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let endpoint = if let Some(endpoint) = lookup("EVBUS_ENDPOINT") {
            Endpoint::parse(&endpoint).context("Invalid EVBUS_ENDPOINT")?
        } else {
            let host = lookup("EVBUS_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
            let port = match lookup("EVBUS_PORT") {
                Some(port) => port.parse().context("Invalid EVBUS_PORT")?,
                None => 5555,
            };
            Endpoint::new(host, port)
        };

        let event_name = lookup("EVBUS_EVENT_NAME").context("EVBUS_EVENT_NAME is required")?;
        let event_name = EventName::new(event_name).context("Invalid EVBUS_EVENT_NAME")?;

        let event_version = match lookup("EVBUS_EVENT_VERSION") {
            Some(version) => EventVersion(version.parse().context("Invalid EVBUS_EVENT_VERSION")?),
            None => EventVersion(1),
        };

        let event_key = match lookup("EVBUS_EVENT_KEY") {
            Some(key) => EventKey::new(key).context("Invalid EVBUS_EVENT_KEY")?,
            None => EventKey::empty(),
        };

        let registry = match lookup("EVBUS_REGISTRY").as_deref() {
            None | Some("memory") => RegistryConfig::Memory,
            Some("sqlite") => RegistryConfig::Sqlite(PathBuf::from(
                lookup("EVBUS_REGISTRY_PATH").unwrap_or_else(|| "./evbus-registry.db".to_string()),
            )),
            Some(other) => bail!("Invalid EVBUS_REGISTRY '{other}': expected memory or sqlite"),
        };

        Ok(Self {
            endpoint,
            event_name,
            event_version,
            event_key,
            registry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<PublishConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        PublishConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[("EVBUS_EVENT_NAME", "orders")]).unwrap();

        assert_eq!(config.endpoint, Endpoint::new("127.0.0.1", 5555));
        assert_eq!(config.event_name.as_str(), "orders");
        assert_eq!(config.event_version, EventVersion(1));
        assert!(config.event_key.is_empty());
        assert_eq!(config.registry, RegistryConfig::Memory);
    }

    #[test]
    fn full_configuration() {
        let config = load(&[
            ("EVBUS_HOST", "10.1.2.3"),
            ("EVBUS_PORT", "6000"),
            ("EVBUS_EVENT_NAME", "shipments"),
            ("EVBUS_EVENT_VERSION", "3"),
            ("EVBUS_EVENT_KEY", "eu-west"),
            ("EVBUS_REGISTRY", "sqlite"),
            ("EVBUS_REGISTRY_PATH", "/tmp/reg.db"),
        ])
        .unwrap();

        assert_eq!(config.endpoint, Endpoint::new("10.1.2.3", 6000));
        assert_eq!(config.event_version, EventVersion(3));
        assert_eq!(config.event_key.as_bytes(), b"eu-west");
        assert_eq!(
            config.registry,
            RegistryConfig::Sqlite(PathBuf::from("/tmp/reg.db"))
        );
    }

    #[test]
    fn endpoint_overrides_host_and_port() {
        let config = load(&[
            ("EVBUS_EVENT_NAME", "orders"),
            ("EVBUS_ENDPOINT", "tcp://10.0.0.7:7000"),
            ("EVBUS_HOST", "10.1.2.3"),
        ])
        .unwrap();

        assert_eq!(config.endpoint, Endpoint::new("10.0.0.7", 7000));
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(load(&[]).is_err());
        assert!(load(&[("EVBUS_EVENT_NAME", "orders"), ("EVBUS_PORT", "70000")]).is_err());
        assert!(load(&[("EVBUS_EVENT_NAME", "orders"), ("EVBUS_EVENT_VERSION", "-1")]).is_err());
        assert!(load(&[("EVBUS_EVENT_NAME", "orders"), ("EVBUS_REGISTRY", "etcd")]).is_err());
        assert!(load(&[("EVBUS_EVENT_NAME", "orders"), ("EVBUS_ENDPOINT", "udp://h:1")]).is_err());
    }
}
