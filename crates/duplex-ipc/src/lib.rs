//! # Duplex IPC
//!
//! Event messaging between processes over two independent channels:
//!
//! - **Broadcast**: the [`Server`] publishes `{event, data}` envelopes to
//!   every connected [`Client`]; fire and forget.
//! - **Request/reply**: a [`Client`] sends one envelope and blocks until the
//!   server's handler answers. One request is in flight per client.
//!
//! Payloads can be encrypted end to end with any
//! [`EncryptionStrategy`]; [`AeadEncryption`] authenticates every message and
//! reports tampering through the compromise callback.
//!
//! ## Example
//!
//! ```rust,ignore
//! use duplex_ipc::{Client, Server};
//! use serde_json::json;
//!
//! let server = Server::new();
//! server.on("double", |data| {
//!     let x = data["x"].as_i64().unwrap_or(0);
//!     Ok(Some(json!({"x": x, "doubled": x * 2})))
//! });
//! server.serve("tcp://*", 5555)?;
//!
//! let client = Client::new();
//! client.connect("tcp://127.0.0.1", 5555, 5, 1000)?;
//! let reply = client.emit("double", json!({"x": 5}))?;
//! assert_eq!(reply["doubled"], 10);
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod client;
mod codec;
pub mod config;
mod connection;
pub mod error;
pub mod router;
pub mod server;
#[cfg(test)]
mod test_support;

pub use client::Client;
pub use config::{IpcConfig, RetryPolicy, DEFAULT_PORT, DEFAULT_URL};
pub use connection::ConnectionState;
pub use error::{IpcError, Result};
pub use router::{EventHandler, EventRouter, HandlerResult, RequestHandler};
pub use server::Server;

// Re-exported so applications need only this crate.
pub use duplex_crypto::{
    AeadEncryption, CompromiseHandler, CryptoError, EncryptionStrategy, KeySize, NoEncryption,
    SecretKey,
};
pub use duplex_types::{Envelope, Value};
