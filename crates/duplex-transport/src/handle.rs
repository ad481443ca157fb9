//! # Socket Handle
//!
//! Exclusive ownership of one [`Socket`]. The handle is the only thing that
//! closes the socket, and it does so at most once: explicitly via
//! [`SocketHandle::close`] or implicitly on drop.
//!
//! `SocketHandle` is deliberately not `Clone`. Threads that need to block on
//! the socket get a [`Socket`] reference through [`SocketHandle::socket`]
//! while the owner keeps the handle.

use tracing::debug;

use crate::{Socket, SocketKind, SocketOptions, TransportError};

/// Owner of one transport socket. `None` means closed.
#[derive(Debug, Default)]
pub struct SocketHandle {
    socket: Option<Socket>,
}

impl SocketHandle {
    /// A handle that owns nothing.
    #[must_use]
    pub fn closed() -> Self {
        Self { socket: None }
    }

    /// Open a socket and take ownership of it.
    ///
    /// # Errors
    ///
    /// Propagates the transport's open failure.
    pub fn open(kind: SocketKind) -> Result<Self, TransportError> {
        Self::open_with(kind, SocketOptions::default())
    }

    /// Open a socket with custom options and take ownership of it.
    ///
    /// # Errors
    ///
    /// Propagates the transport's open failure.
    pub fn open_with(kind: SocketKind, options: SocketOptions) -> Result<Self, TransportError> {
        Ok(Self {
            socket: Some(Socket::open_with(kind, options)?),
        })
    }

    /// True while the handle owns an open socket.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Reference to the owned socket, for dial/listen/send/recv.
    ///
    /// # Errors
    ///
    /// `TransportError::Closed` if the handle is closed.
    pub fn socket(&self) -> Result<&Socket, TransportError> {
        self.socket.as_ref().ok_or(TransportError::Closed)
    }

    /// Close the owned socket. No-op if already closed.
    pub fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            debug!(socket = socket.id(), kind = %socket.kind(), "Closing socket handle");
            socket.close();
        }
    }

    /// Move ownership out, leaving this handle closed.
    #[must_use]
    pub fn take(&mut self) -> SocketHandle {
        SocketHandle {
            socket: self.socket.take(),
        }
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        self.close();
    }
}
