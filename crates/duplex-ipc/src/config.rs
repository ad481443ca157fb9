//! Connection settings, loadable from the environment.

use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use duplex_crypto::{AeadEncryption, EncryptionStrategy};

use crate::{IpcError, Result};

/// Default base URL for both channels.
pub const DEFAULT_URL: &str = "tcp://127.0.0.1";

/// Default broadcast port; the request channel uses the next port.
pub const DEFAULT_PORT: u16 = 5555;

/// How often and how patiently a client dials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Connection attempts before giving up. Zero means no attempt is made.
    pub max_retries: u32,
    /// Pause between two attempts. Not applied after the last one.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Build from an attempt count and a delay in milliseconds.
    pub fn new(max_retries: u32, retry_delay_ms: u64) -> Self {
        Self {
            max_retries,
            retry_delay: Duration::from_millis(retry_delay_ms),
        }
    }
}

/// Everything needed to connect a client or start a server.
#[derive(Clone)]
pub struct IpcConfig {
    /// `tcp://host` without the port.
    pub url: String,
    /// Broadcast port. The request channel listens on `port + 1`.
    pub port: u16,
    /// Client dial policy.
    pub retry: RetryPolicy,
    /// Hex-encoded AEAD key. `None` disables encryption.
    pub encryption_key: Option<String>,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            port: DEFAULT_PORT,
            retry: RetryPolicy::default(),
            encryption_key: None,
        }
    }
}

impl fmt::Debug for IpcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpcConfig")
            .field("url", &self.url)
            .field("port", &self.port)
            .field("retry", &self.retry)
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl IpcConfig {
    /// Load from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DUPLEX_URL`: Base URL (default: tcp://127.0.0.1)
    /// - `DUPLEX_PORT`: Broadcast port (default: 5555)
    /// - `DUPLEX_MAX_RETRIES`: Client connection attempts (default: 5)
    /// - `DUPLEX_RETRY_DELAY_MS`: Pause between attempts (default: 1000)
    /// - `DUPLEX_ENCRYPTION_KEY`: Hex AEAD key (default: unset, no encryption)
    ///
    /// # Errors
    ///
    /// `IpcError::Config` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self> {
        let defaults = Self::default();

        let port = parse_var(&lookup, "DUPLEX_PORT")?.unwrap_or(defaults.port);
        let max_retries =
            parse_var(&lookup, "DUPLEX_MAX_RETRIES")?.unwrap_or(defaults.retry.max_retries);
        let retry_delay = parse_var::<u64, _>(&lookup, "DUPLEX_RETRY_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry.retry_delay);

        Ok(Self {
            url: lookup("DUPLEX_URL").unwrap_or(defaults.url),
            port,
            retry: RetryPolicy {
                max_retries,
                retry_delay,
            },
            encryption_key: lookup("DUPLEX_ENCRYPTION_KEY").filter(|key| !key.trim().is_empty()),
        })
    }

    /// Port of the request/reply channel.
    ///
    /// # Errors
    ///
    /// `IpcError::InvalidEndpoint` if `port + 1` overflows.
    pub fn request_port(&self) -> Result<u16> {
        request_port(self.port)
    }

    /// Strategy for the configured key, or `None` when no key is set.
    ///
    /// # Errors
    ///
    /// `IpcError::Config` if the key is not valid hex of 16, 24 or 32 bytes.
    pub fn encryption(&self) -> Result<Option<Arc<dyn EncryptionStrategy>>> {
        match &self.encryption_key {
            None => Ok(None),
            Some(hex_key) => {
                let strategy: Arc<dyn EncryptionStrategy> = Arc::new(
                    AeadEncryption::from_hex(hex_key.trim())
                        .map_err(|e| IpcError::Config(format!("DUPLEX_ENCRYPTION_KEY: {e}")))?,
                );
                Ok(Some(strategy))
            }
        }
    }
}

/// The request channel sits one port above the broadcast channel.
pub(crate) fn request_port(port: u16) -> Result<u16> {
    port.checked_add(1).ok_or_else(|| {
        IpcError::InvalidEndpoint(format!(
            "broadcast port {port} leaves no room for the request port"
        ))
    })
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| IpcError::Config(format!("{key}=`{raw}`: {e}")))
        })
        .transpose()
}
