//! # Duplex Crypto - Payload Encryption Strategies
//!
//! Every payload a client or server puts on the wire passes through an
//! [`EncryptionStrategy`]. Two are provided:
//!
//! | Strategy | Wire form | Use Case |
//! |----------|-----------|----------|
//! | [`NoEncryption`] | plaintext | Trusted hosts, debugging |
//! | [`AeadEncryption`] | `nonce(16) \|\| ciphertext \|\| tag(16)` | Default for untrusted links |
//!
//! ## Security Properties
//!
//! - **AES-GCM, 128-bit nonce**: a fresh random nonce per message
//! - **Fail closed**: no partial plaintext is ever returned
//! - **Compromise hook**: every authentication failure fires the handler
//!   registered with [`EncryptionStrategy::set_on_compromised_handler`]

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod errors;
pub mod noop;
pub mod strategy;
pub mod symmetric;

// Re-exports
pub use errors::CryptoError;
pub use noop::NoEncryption;
pub use strategy::{CompromiseHandler, EncryptionStrategy};
pub use symmetric::{AeadEncryption, KeySize, SecretKey, MIN_CIPHERTEXT_LEN, NONCE_LEN, TAG_LEN};
