//! # Duplex Transport - Blocking Message Sockets
//!
//! Four socket kinds over TCP, paired two by two:
//!
//! ```text
//!   ┌──────────┐   broadcast (port)     ┌──────────┐
//!   │   Pub    │ ─────────────────────► │   Sub    │  × N subscribers
//!   │ (listen) │                        │  (dial)  │
//!   └──────────┘                        └──────────┘
//!   ┌──────────┐   request (port + 1)   ┌──────────┐
//!   │   Rep    │ ◄────────────────────► │   Req    │  × N requesters
//!   │ (listen) │    one reply each      │  (dial)  │
//!   └──────────┘                        └──────────┘
//! ```
//!
//! ## Contract
//!
//! - `recv` blocks until a message arrives or the socket is closed, and
//!   returns an owned buffer.
//! - Closing a socket from any thread unblocks every pending `recv`, which
//!   then returns [`TransportError::Closed`]. No other error means that.
//! - [`SocketHandle`] owns a socket exclusively and closes it exactly once.
//!
//! Messages are framed with a 4-byte big-endian length prefix.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod endpoint;
pub mod error;
pub mod frame;
pub mod handle;
mod inbox;
mod protocol;
pub mod socket;

// Re-export main types
pub use endpoint::Endpoint;
pub use error::TransportError;
pub use handle::SocketHandle;
pub use socket::{Socket, SocketKind, SocketOptions};

/// Largest message accepted by default (16 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Messages buffered per receiving socket before new ones are dropped.
pub const DEFAULT_RECV_BUFFER: usize = 1024;
