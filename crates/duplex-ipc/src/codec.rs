//! Envelope encoding plus the optional encryption step.
//!
//! The strategy sits behind a shared lock so it can be swapped while the
//! background loop is running; each message uses whichever strategy is set
//! when it is processed. With no strategy set, payloads travel as plain JSON.

use std::sync::Arc;

use duplex_crypto::{CompromiseHandler, CryptoError, EncryptionStrategy};
use duplex_telemetry::metrics;
use duplex_types::Envelope;
use parking_lot::RwLock;
use tracing::warn;

use crate::Result;

#[derive(Clone)]
pub(crate) struct Codec {
    role: &'static str,
    strategy: Arc<RwLock<Option<Arc<dyn EncryptionStrategy>>>>,
}

impl Codec {
    pub(crate) fn new(role: &'static str) -> Self {
        Self {
            role,
            strategy: Arc::new(RwLock::new(None)),
        }
    }

    pub(crate) fn set_strategy(&self, strategy: Arc<dyn EncryptionStrategy>) {
        *self.strategy.write() = Some(strategy);
    }

    pub(crate) fn strategy(&self) -> Option<Arc<dyn EncryptionStrategy>> {
        self.strategy.read().clone()
    }

    /// Forward `handler` to the active strategy. Returns false when no
    /// strategy is set.
    pub(crate) fn set_on_compromised(&self, handler: CompromiseHandler) -> bool {
        match self.strategy() {
            Some(strategy) => {
                strategy.set_on_compromised_handler(handler);
                true
            }
            None => false,
        }
    }

    /// Encode and encrypt an envelope.
    pub(crate) fn seal(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        self.seal_bytes(envelope.encode()?)
    }

    pub(crate) fn seal_bytes(&self, plaintext: Vec<u8>) -> Result<Vec<u8>> {
        match self.strategy() {
            Some(strategy) => Ok(strategy.encrypt(&plaintext)?),
            None => Ok(plaintext),
        }
    }

    /// Decrypt a wire payload.
    pub(crate) fn open(&self, payload: Vec<u8>) -> Result<Vec<u8>> {
        let Some(strategy) = self.strategy() else {
            return Ok(payload);
        };
        strategy.decrypt(&payload).map_err(|e| {
            if e.is_security_failure() {
                self.record_compromise(strategy.name(), &e);
            }
            e.into()
        })
    }

    fn record_compromise(&self, strategy: &str, error: &CryptoError) {
        metrics::record_decrypt_failure(self.role);
        warn!(role = self.role, strategy, error = %error, "Inbound message failed authentication");
    }
}
