//! # Authenticated Symmetric Encryption
//!
//! AES-GCM with a 128-bit nonce, keyed with 128, 192 or 256 bits.
//!
//! ## Wire Format
//!
//! ```text
//! ┌──────────────┬──────────────────────┬──────────────┐
//! │ nonce (16 B) │ ciphertext (len(p))  │ tag (16 B)   │
//! └──────────────┴──────────────────────┴──────────────┘
//! ```
//!
//! A nonce is drawn from the thread RNG for every message, so the same key
//! can be shared by any number of peers without coordination.

use std::fmt;

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::{Aes128, Aes192, Aes256};
use aes_gcm::AesGcm;
use parking_lot::RwLock;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CompromiseHandler, CryptoError, EncryptionStrategy};

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 16;

/// Authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Shortest input `decrypt` will attempt to open.
pub const MIN_CIPHERTEXT_LEN: usize = NONCE_LEN + TAG_LEN;

type Aes128Gcm16 = AesGcm<Aes128, U16>;
type Aes192Gcm16 = AesGcm<Aes192, U16>;
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// AES key size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeySize {
    /// 16-byte key
    Aes128,
    /// 24-byte key
    Aes192,
    /// 32-byte key (default)
    #[default]
    Aes256,
}

impl KeySize {
    /// Key length in bytes.
    #[must_use]
    pub fn byte_len(self) -> usize {
        match self {
            KeySize::Aes128 => 16,
            KeySize::Aes192 => 24,
            KeySize::Aes256 => 32,
        }
    }

    /// Map a byte length to a key size.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` for anything but 16, 24 or 32.
    pub fn from_len(len: usize) -> Result<Self, CryptoError> {
        match len {
            16 => Ok(KeySize::Aes128),
            24 => Ok(KeySize::Aes192),
            32 => Ok(KeySize::Aes256),
            actual => Err(CryptoError::InvalidKeyLength { actual }),
        }
    }
}

/// Symmetric key material, wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    /// Create from bytes.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` unless `bytes` is 16, 24 or 32 long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        KeySize::from_len(bytes.len())?;
        Ok(Self(bytes.to_vec()))
    }

    /// Parse a hex string (e.g. from configuration).
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKey` on bad hex, or
    /// `CryptoError::InvalidKeyLength` if the decoded key has the wrong size.
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        let mut bytes =
            hex::decode(hex_key.trim()).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let key = Self::from_bytes(&bytes);
        bytes.zeroize();
        key
    }

    /// Generate a random key.
    pub fn generate(size: KeySize) -> Self {
        let mut bytes = vec![0u8; size.byte_len()];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    /// Get inner bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Key size.
    pub fn size(&self) -> KeySize {
        // Length is validated by every constructor.
        KeySize::from_len(self.0.len()).unwrap_or_default()
    }

    /// Hex form, for handing the key to the peer process.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretKey").field(&"<redacted>").finish()
    }
}

/// AES-GCM strategy with a random 16-byte nonce per message.
pub struct AeadEncryption {
    key: SecretKey,
    on_compromised: RwLock<Option<CompromiseHandler>>,
}

impl AeadEncryption {
    /// Create a strategy from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` unless the key is 16, 24 or 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self::with_key(SecretKey::from_bytes(key)?))
    }

    /// Create a strategy from a hex-encoded key.
    ///
    /// # Errors
    ///
    /// See [`SecretKey::from_hex`].
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        Ok(Self::with_key(SecretKey::from_hex(hex_key)?))
    }

    /// Create a strategy around an existing key.
    pub fn with_key(key: SecretKey) -> Self {
        Self {
            key,
            on_compromised: RwLock::new(None),
        }
    }

    /// Create a strategy with a freshly generated key.
    pub fn generate(size: KeySize) -> Self {
        Self::with_key(SecretKey::generate(size))
    }

    /// The key in use.
    pub fn key(&self) -> &SecretKey {
        &self.key
    }

    fn compromised(&self, err: CryptoError) -> CryptoError {
        debug!(error = %err, "Inbound payload failed authentication");
        let handler = self.on_compromised.read().clone();
        if let Some(handler) = handler {
            handler();
        }
        err
    }
}

impl fmt::Debug for AeadEncryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AeadEncryption")
            .field("key_size", &self.key.size())
            .field("on_compromised", &self.on_compromised.read().is_some())
            .finish()
    }
}

fn seal<C: Aead + KeyInit>(
    key: &[u8],
    nonce: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher =
        C::new_from_slice(key).map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    cipher
        .encrypt(GenericArray::from_slice(nonce), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

fn open<C: Aead + KeyInit>(
    key: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = C::new_from_slice(key).map_err(|_| CryptoError::AuthenticationFailed)?;
    cipher
        .decrypt(GenericArray::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailed)
}

impl EncryptionStrategy for AeadEncryption {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nonce);

        let key = self.key.as_bytes();
        let sealed = match self.key.size() {
            KeySize::Aes128 => seal::<Aes128Gcm16>(key, &nonce, plaintext)?,
            KeySize::Aes192 => seal::<Aes192Gcm16>(key, &nonce, plaintext)?,
            KeySize::Aes256 => seal::<Aes256Gcm16>(key, &nonce, plaintext)?,
        };

        let mut message = Vec::with_capacity(NONCE_LEN + sealed.len());
        message.extend_from_slice(&nonce);
        message.extend_from_slice(&sealed);
        Ok(message)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < MIN_CIPHERTEXT_LEN {
            return Err(self.compromised(CryptoError::CiphertextTooShort {
                actual: ciphertext.len(),
                min: MIN_CIPHERTEXT_LEN,
            }));
        }

        let (nonce, body) = ciphertext.split_at(NONCE_LEN);
        let key = self.key.as_bytes();
        let opened = match self.key.size() {
            KeySize::Aes128 => open::<Aes128Gcm16>(key, nonce, body),
            KeySize::Aes192 => open::<Aes192Gcm16>(key, nonce, body),
            KeySize::Aes256 => open::<Aes256Gcm16>(key, nonce, body),
        };

        opened.map_err(|e| self.compromised(e))
    }

    fn set_on_compromised_handler(&self, handler: CompromiseHandler) {
        *self.on_compromised.write() = Some(handler);
    }

    fn name(&self) -> &'static str {
        "aes-gcm"
    }
}
