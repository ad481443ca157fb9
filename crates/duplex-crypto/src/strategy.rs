//! # Encryption Strategy
//!
//! The seam between the messaging layer and the cipher. Clients and servers
//! hold an `Arc<dyn EncryptionStrategy>` and call it on every payload.

use std::sync::Arc;

use crate::CryptoError;

/// Callback fired when an inbound message fails authentication.
pub type CompromiseHandler = Arc<dyn Fn() + Send + Sync>;

/// A symmetric transform applied to every outbound and inbound payload.
pub trait EncryptionStrategy: Send + Sync {
    /// Transform a plaintext payload into its wire form.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EncryptionFailed` if the cipher rejects the input.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Recover the plaintext from its wire form.
    ///
    /// Implementations that authenticate must invoke the compromise handler
    /// exactly once before returning a security failure.
    ///
    /// # Errors
    ///
    /// Returns a `CryptoError` for which `is_security_failure()` holds when the
    /// input is undersized or fails authentication.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Install (or replace) the handler fired on authentication failure.
    fn set_on_compromised_handler(&self, handler: CompromiseHandler);

    /// Short name for logs.
    fn name(&self) -> &'static str;
}
