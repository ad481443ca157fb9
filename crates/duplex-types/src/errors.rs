//! # Error Types
//!
//! Errors raised while encoding or decoding envelopes.

use thiserror::Error;

/// A message could not be turned into (or built from) an [`Envelope`](crate::Envelope).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The bytes are not valid JSON, or a required field is missing.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// A reply could not be parsed as JSON.
    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    /// The envelope could not be serialized.
    #[error("Encoding failed: {0}")]
    Encoding(String),
}
