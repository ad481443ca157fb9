//! Endpoint addressing: `tcp://host:port`.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};

use crate::TransportError;

/// The only supported scheme.
pub const TCP_SCHEME: &str = "tcp";

/// Host that binds every interface when listening.
pub const WILDCARD_HOST: &str = "*";

/// A parsed `scheme://host:port` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Parse `tcp://host:port`. IPv6 hosts go in brackets (`tcp://[::1]:5555`).
    ///
    /// # Errors
    ///
    /// `UnsupportedScheme` for anything but `tcp`, `AddressInvalid` for a
    /// missing host or port.
    pub fn parse(url: &str) -> Result<Self, TransportError> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| TransportError::AddressInvalid(format!("missing scheme in `{url}`")))?;

        if !scheme.eq_ignore_ascii_case(TCP_SCHEME) {
            return Err(TransportError::UnsupportedScheme(scheme.to_string()));
        }

        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| TransportError::AddressInvalid(format!("missing port in `{url}`")))?;

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(TransportError::AddressInvalid(format!("missing host in `{url}`")));
        }

        let port = port
            .parse::<u16>()
            .map_err(|e| TransportError::AddressInvalid(format!("bad port in `{url}`: {e}")))?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// Build from a `scheme://host` base and a port.
    ///
    /// # Errors
    ///
    /// See [`Endpoint::parse`].
    pub fn from_base(base: &str, port: u16) -> Result<Self, TransportError> {
        Self::parse(&format!("{base}:{port}"))
    }

    /// Host part.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port part.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolve to a socket address. `*` maps to `0.0.0.0`.
    ///
    /// # Errors
    ///
    /// `AddressInvalid` if the host does not resolve.
    pub fn resolve(&self) -> Result<SocketAddr, TransportError> {
        if self.host == WILDCARD_HOST {
            return Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port)));
        }

        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| TransportError::AddressInvalid(format!("{self}: {e}")))?
            .next()
            .ok_or_else(|| TransportError::AddressInvalid(format!("{self}: no addresses")))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{TCP_SCHEME}://[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{TCP_SCHEME}://{}:{}", self.host, self.port)
        }
    }
}
