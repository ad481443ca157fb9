//! Identity strategy.

use crate::{CompromiseHandler, CryptoError, EncryptionStrategy};

/// Passes payloads through untouched.
///
/// Nothing is authenticated, so the compromise handler is accepted and never
/// fired.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEncryption;

impl NoEncryption {
    /// Create the identity strategy.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl EncryptionStrategy for NoEncryption {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(ciphertext.to_vec())
    }

    fn set_on_compromised_handler(&self, _handler: CompromiseHandler) {}

    fn name(&self) -> &'static str {
        "none"
    }
}
