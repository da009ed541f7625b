//! ALFA Vault Engine - Key Manager
//!
//! Generates entropy-checked 256-bit keys and derives rotated keys with
//! HKDF-SHA256. Persisting keys is the secure store's job, not this one's.

use std::sync::Arc;

use zeroize::Zeroizing;

use crate::crypto::entropy::{self, KeyStrength};
use crate::crypto::hkdf::derive_subkey;
use crate::crypto::keys::{fill_random, SymmetricKey, KEY_LEN, ROTATION_SALT_LEN};
use crate::error::{VaultError, VaultResult};
use crate::events::{SecurityEvent, SecurityEventSink, TracingEventSink};
use crate::rotation::KeyRotationMetadata;

/// Attempts before a degraded random source is reported
pub const MAX_GENERATE_ATTEMPTS: u32 = 3;

/// Source of raw key material
pub trait EntropySource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> VaultResult<()>;
}

/// Operating system CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> VaultResult<()> {
        fill_random(buf)
    }
}

/// Key generation, validation and rotation
#[derive(Clone)]
pub struct KeyManager {
    source: Arc<dyn EntropySource>,
    events: Arc<dyn SecurityEventSink>,
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new(Arc::new(OsEntropy), Arc::new(TracingEventSink))
    }
}

impl KeyManager {
    pub fn new(source: Arc<dyn EntropySource>, events: Arc<dyn SecurityEventSink>) -> Self {
        Self { source, events }
    }

    /// Generate a fresh key whose entropy clears [`entropy::MIN_KEY_ENTROPY`].
    ///
    /// Gives up after [`MAX_GENERATE_ATTEMPTS`]; a persistent failure means
    /// the random source is degraded and must not be retried blindly.
    pub fn generate(&self) -> VaultResult<SymmetricKey> {
        for attempt in 1..=MAX_GENERATE_ATTEMPTS {
            let mut buf = Zeroizing::new([0u8; KEY_LEN]);
            self.source.fill(&mut *buf)?;

            if entropy::validate(&*buf) {
                return Ok(SymmetricKey::from_bytes(*buf));
            }

            tracing::warn!(attempt, "rejected low-entropy key material");
            self.events.notify(&SecurityEvent::EntropyValidationFailed);
        }

        Err(VaultError::InsufficientEntropy {
            attempts: MAX_GENERATE_ATTEMPTS,
        })
    }

    /// Derive a successor of `old_key`.
    ///
    /// HKDF-SHA256 with a fresh random salt and `context` as info. `old_key`
    /// is untouched; the caller retires it once data is re-encrypted and
    /// then reports the switch with [`KeyManager::rotation_committed`].
    pub fn rotate(
        &self,
        old_key: &SymmetricKey,
        context: &str,
        previous: &KeyRotationMetadata,
    ) -> VaultResult<(SymmetricKey, KeyRotationMetadata)> {
        if context.is_empty() {
            return Err(VaultError::KeyDerivationFailed(
                "rotation context must not be empty".into(),
            ));
        }

        let mut salt = Zeroizing::new([0u8; ROTATION_SALT_LEN]);
        self.source.fill(&mut *salt)?;

        let new_key = derive_subkey(old_key, &*salt, context.as_bytes())?;
        let metadata = previous.next();

        tracing::debug!(version = metadata.version, "derived rotated key");
        Ok((new_key, metadata))
    }

    /// Announce a rotated key that is now in use
    pub fn rotation_committed(&self, metadata: &KeyRotationMetadata) {
        self.events.notify(&SecurityEvent::KeyRotated {
            version: metadata.version,
        });
    }

    /// Metadata for a key created at enrollment
    pub fn initial_metadata(&self, rounds: u32) -> KeyRotationMetadata {
        KeyRotationMetadata::initial(rounds)
    }

    /// Report entropy and rating for candidate key bytes
    pub fn analyze_key_strength(&self, key: &[u8]) -> KeyStrength {
        entropy::analyze(key)
    }
}
