//! Bind endpoints.

use crate::TransportError;
use std::fmt;
use std::net::IpAddr;
use url::Url;

/// Host meaning "all interfaces".
pub const ANY_HOST: &str = "*";

/// A `host:port` bind address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name, IP address, or `*` for all interfaces
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `tcp://host:port`, `host:port` or `*:port`.
    ///
    /// # Errors
    ///
    /// Returns error if the address is malformed or the port is missing.
    pub fn parse(input: &str) -> Result<Self, TransportError> {
        if input.contains("://") {
            return parse_url(input);
        }

        let (host, port) = input
            .rsplit_once(':')
            .ok_or_else(|| TransportError::InvalidEndpoint(format!("{input}: missing port")))?;
        if host.is_empty() {
            return Err(TransportError::InvalidEndpoint(format!(
                "{input}: missing host"
            )));
        }
        let port = port.parse().map_err(|_| {
            TransportError::InvalidEndpoint(format!("{input}: invalid port '{port}'"))
        })?;

        Ok(Self::new(host, port))
    }

    /// Whether the host means "all interfaces" (`*`, `0.0.0.0` or `::`).
    ///
    /// Such a host is fine to bind but cannot be handed to subscribers.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.host == ANY_HOST
            || self
                .host
                .trim_start_matches('[')
                .trim_end_matches(']')
                .parse::<IpAddr>()
                .is_ok_and(|ip| ip.is_unspecified())
    }

    /// Address handed to the OS when binding.
    #[must_use]
    pub fn bind_address(&self) -> String {
        let host = if self.host == ANY_HOST {
            "0.0.0.0"
        } else {
            self.host.trim_start_matches('[').trim_end_matches(']')
        };
        if host.contains(':') {
            format!("[{host}]:{}", self.port)
        } else {
            format!("{host}:{}", self.port)
        }
    }
}

fn parse_url(input: &str) -> Result<Endpoint, TransportError> {
    let url =
        Url::parse(input).map_err(|e| TransportError::InvalidEndpoint(format!("{input}: {e}")))?;

    if url.scheme() != "tcp" {
        return Err(TransportError::InvalidEndpoint(format!(
            "{input}: unsupported scheme '{}'",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .ok_or_else(|| TransportError::InvalidEndpoint(format!("{input}: missing host")))?;
    let port = url
        .port()
        .ok_or_else(|| TransportError::InvalidEndpoint(format!("{input}: missing port")))?;

    Ok(Endpoint::new(host, port))
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tcp_url() {
        let endpoint = Endpoint::parse("tcp://localhost:5555").unwrap();
        assert_eq!(endpoint, Endpoint::new("localhost", 5555));
    }

    #[test]
    fn parse_plain_address() {
        let endpoint = Endpoint::parse("10.0.0.7:6000").unwrap();
        assert_eq!(endpoint.host, "10.0.0.7");
        assert_eq!(endpoint.port, 6000);
    }

    #[test]
    fn wildcard_binds_all_interfaces() {
        let endpoint = Endpoint::parse("*:5555").unwrap();
        assert_eq!(endpoint.bind_address(), "0.0.0.0:5555");
        assert_eq!(endpoint.to_string(), "tcp://*:5555");
    }

    #[test]
    fn wildcard_hosts() {
        assert!(Endpoint::parse("*:5555").unwrap().is_wildcard());
        assert!(Endpoint::parse("0.0.0.0:5555").unwrap().is_wildcard());
        assert!(Endpoint::parse("tcp://[::]:5555").unwrap().is_wildcard());
        assert!(!Endpoint::parse("127.0.0.1:5555").unwrap().is_wildcard());
        assert!(!Endpoint::parse("bus.internal:5555").unwrap().is_wildcard());
    }

    #[test]
    fn ipv6_bind_address() {
        let endpoint = Endpoint::parse("tcp://[::1]:7000").unwrap();
        assert_eq!(endpoint.bind_address(), "[::1]:7000");
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(Endpoint::parse("localhost").is_err());
        assert!(Endpoint::parse(":5555").is_err());
        assert!(Endpoint::parse("localhost:port").is_err());
        assert!(Endpoint::parse("udp://localhost:5555").is_err());
        assert!(Endpoint::parse("tcp://localhost").is_err());
    }
}
