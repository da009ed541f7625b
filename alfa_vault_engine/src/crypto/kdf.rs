//! PIN stretching - PBKDF2-HMAC-SHA256
//!
//! Every profile's PIN hash uses the same iterated, salted scheme and the same
//! round count, so checking one profile costs exactly as much as another.

use pbkdf2::pbkdf2_hmac;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::keys::{generate_salt, SALT_LEN};
use crate::error::{VaultError, VaultResult};

/// Derived output length
pub const KDF_OUTPUT_LEN: usize = 32;

/// Minimum enforced round count; lower requests are clamped up
pub const MIN_ROUNDS: u32 = 100_000;

/// PIN hashing scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PinHashAlgorithm {
    /// PBKDF2 with HMAC-SHA256, salted and iterated
    Pbkdf2HmacSha256,
    /// Single unsalted SHA-256 pass written by older builds; never accepted
    LegacySha256,
}

/// Stored PIN verifier for one profile
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct PinHash {
    #[serde(with = "b64")]
    pub hash: Vec<u8>,
    #[serde(with = "b64")]
    pub salt: Vec<u8>,
    #[zeroize(skip)]
    pub algorithm: PinHashAlgorithm,
    pub iterations: u32,
}

impl PinHash {
    /// Reject verifiers the router cannot evaluate in constant time
    pub fn ensure_supported(&self) -> VaultResult<()> {
        match self.algorithm {
            PinHashAlgorithm::Pbkdf2HmacSha256 => {}
            PinHashAlgorithm::LegacySha256 => {
                return Err(VaultError::InvalidConfig(
                    "legacy single-pass PIN hash must be re-enrolled".into(),
                ));
            }
        }
        if self.hash.len() != KDF_OUTPUT_LEN {
            return Err(VaultError::InvalidConfig(format!(
                "PIN hash must be {} bytes, got {}",
                KDF_OUTPUT_LEN,
                self.hash.len()
            )));
        }
        if self.salt.len() < SALT_LEN {
            return Err(VaultError::InvalidConfig(format!(
                "PIN salt must be at least {} bytes",
                SALT_LEN
            )));
        }
        if self.iterations < MIN_ROUNDS {
            return Err(VaultError::InvalidConfig(format!(
                "PIN hash iterations below {}",
                MIN_ROUNDS
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for PinHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinHash")
            .field("algorithm", &self.algorithm)
            .field("iterations", &self.iterations)
            .finish_non_exhaustive()
    }
}

/// Password-based key derivation with an enforced round floor
#[derive(Debug, Clone, Copy)]
pub struct PasswordKdf {
    min_rounds: u32,
}

impl Default for PasswordKdf {
    fn default() -> Self {
        Self {
            min_rounds: MIN_ROUNDS,
        }
    }
}

impl PasswordKdf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lower floor so timing tests can run hundreds of evaluations.
    #[cfg(test)]
    pub(crate) fn with_min_rounds(min_rounds: u32) -> Self {
        Self { min_rounds }
    }

    /// Round count actually used for a requested value
    pub fn effective_rounds(&self, requested: u32) -> u32 {
        requested.max(self.min_rounds)
    }

    /// Derive 32 bytes from `secret` and `salt`
    pub fn derive(
        &self,
        secret: &str,
        salt: &[u8],
        rounds: u32,
    ) -> VaultResult<Zeroizing<[u8; KDF_OUTPUT_LEN]>> {
        if secret.is_empty() {
            return Err(VaultError::KeyDerivationFailed("empty secret".into()));
        }
        if salt.len() < SALT_LEN {
            return Err(VaultError::KeyDerivationFailed(format!(
                "salt must be at least {} bytes, got {}",
                SALT_LEN,
                salt.len()
            )));
        }
        Ok(self.stretch(secret.as_bytes(), salt, rounds))
    }

    /// Unvalidated derivation; the router calls this so that malformed input
    /// still costs a full derivation.
    pub(crate) fn stretch(
        &self,
        secret: &[u8],
        salt: &[u8],
        rounds: u32,
    ) -> Zeroizing<[u8; KDF_OUTPUT_LEN]> {
        let mut output = Zeroizing::new([0u8; KDF_OUTPUT_LEN]);
        pbkdf2_hmac::<Sha256>(secret, salt, self.effective_rounds(rounds), &mut *output);
        output
    }

    /// Hash a PIN for enrollment with a fresh random salt
    pub fn hash_pin(&self, pin: &SecretString, rounds: u32) -> VaultResult<PinHash> {
        let salt = generate_salt()?;
        let hash = self.derive(pin.expose_secret(), &salt, rounds)?;

        Ok(PinHash {
            hash: hash.to_vec(),
            salt: salt.to_vec(),
            algorithm: PinHashAlgorithm::Pbkdf2HmacSha256,
            iterations: self.effective_rounds(rounds),
        })
    }
}

mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
