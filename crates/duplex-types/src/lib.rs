//! # Duplex Types Crate
//!
//! The message envelope and the reply objects shared by clients and servers.
//!
//! ## Design Principles
//!
//! - **One envelope**: every payload on both channels is an [`Envelope`],
//!   `{"event": ..., "data": ...}` serialized as JSON.
//! - **Replies are plain values**: a request handler may answer with any JSON
//!   value; the reserved `__response__` and `__error__` events mark replies
//!   synthesized by the server itself.

pub mod envelope;
pub mod errors;
pub mod response;

pub use envelope::Envelope;
pub use errors::ProtocolError;
pub use response::{ReplyStatus, ERROR_EVENT, RESPONSE_EVENT};

/// JSON value carried in the `data` field of an envelope.
pub use serde_json::Value;
