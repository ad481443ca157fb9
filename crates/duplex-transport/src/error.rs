//! Transport error types.

use std::io;

use thiserror::Error;

use crate::SocketKind;

/// Errors from socket operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The socket was closed. Terminal for blocking receives.
    #[error("Socket closed")]
    Closed,

    /// The address could not be parsed or resolved.
    #[error("Invalid address: {0}")]
    AddressInvalid(String),

    /// Only `tcp://` endpoints are supported.
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// Nobody is listening at the dialed address.
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// The listen address is already bound.
    #[error("Address in use: {0}")]
    AddressInUse(String),

    /// The operation timed out.
    #[error("Timed out: {0}")]
    TimedOut(String),

    /// The socket kind does not support the operation.
    #[error("Operation {op} not supported by {kind} socket")]
    NotSupported { kind: SocketKind, op: &'static str },

    /// The operation is not valid in the socket's current state.
    #[error("Incorrect state: {0}")]
    IncorrectState(&'static str),

    /// The message exceeds the configured maximum.
    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// True for [`TransportError::Closed`].
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::Closed)
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionRefused => TransportError::ConnectionRefused(e.to_string()),
            io::ErrorKind::AddrInUse => TransportError::AddressInUse(e.to_string()),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                TransportError::TimedOut(e.to_string())
            }
            _ => TransportError::Io(e.to_string()),
        }
    }
}
