//! Crypto error types.

use thiserror::Error;

/// Encryption strategy errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Key is not 16, 24 or 32 bytes long
    #[error("Invalid key length {actual}: expected 16, 24 or 32 bytes")]
    InvalidKeyLength {
        /// Actual key length in bytes
        actual: usize,
    },

    /// Key material could not be parsed
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Ciphertext shorter than nonce plus tag
    #[error("Ciphertext too short: {actual} bytes, need at least {min}")]
    CiphertextTooShort {
        /// Actual input length in bytes
        actual: usize,
        /// Minimum accepted length in bytes
        min: usize,
    },

    /// Tag verification failed (tampered, truncated or wrong key)
    #[error("Decryption failed: message authentication failed")]
    AuthenticationFailed,
}

impl CryptoError {
    /// True for failures that indicate a tampered or forged message.
    ///
    /// These are the errors that fire the compromise handler.
    #[must_use]
    pub fn is_security_failure(&self) -> bool {
        matches!(
            self,
            CryptoError::CiphertextTooShort { .. } | CryptoError::AuthenticationFailed
        )
    }
}
