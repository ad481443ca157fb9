//! Error types for clients and servers.

use duplex_crypto::CryptoError;
use duplex_transport::TransportError;
use duplex_types::ProtocolError;
use thiserror::Error;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, IpcError>;

/// Errors surfaced by [`Client`](crate::Client) and [`Server`](crate::Server).
#[derive(Debug, Error)]
pub enum IpcError {
    /// A socket operation failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A message could not be encoded or decoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Encryption failed, or a message failed authentication.
    #[error("Security error: {0}")]
    Security(#[from] CryptoError),

    /// A request handler returned an error or panicked.
    #[error("Application error: {0}")]
    Application(String),

    #[error("Client is not connected")]
    NotConnected,

    #[error("Server is not started")]
    NotStarted,

    #[error("Client is already connected")]
    AlreadyConnected,

    #[error("Server is already started")]
    AlreadyStarted,

    /// Every connection attempt failed.
    #[error(
        "Failed to connect after {attempts} attempts \
         (broadcast {broadcast_endpoint}: {broadcast_error}; \
         request {request_endpoint}: {request_error})"
    )]
    ConnectFailed {
        attempts: u32,
        broadcast_endpoint: String,
        broadcast_error: String,
        request_endpoint: String,
        request_error: String,
    },

    /// The url/port pair does not form a usable endpoint.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IpcError {
    /// Text placed in the `message` field of an error reply.
    ///
    /// Application errors carry the handler's own message unprefixed.
    pub fn reply_message(&self) -> String {
        match self {
            IpcError::Application(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for IpcError {
    fn from(err: std::io::Error) -> Self {
        IpcError::Transport(err.into())
    }
}
