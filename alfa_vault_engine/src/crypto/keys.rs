//! ALFA Vault Engine - Key Material
//!
//! Symmetric key wrapper plus the random helpers every other module uses.

use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};

use crate::error::{VaultError, VaultResult};

/// Key length for ChaCha20-Poly1305 / AES-256
pub const KEY_LEN: usize = 32;

/// Nonce length (96 bits) for both supported AEADs
pub const NONCE_LEN: usize = 12;

/// Authentication tag length (128 bits)
pub const TAG_LEN: usize = 16;

/// Salt length for PIN hashing
pub const SALT_LEN: usize = 16;

/// Salt length for rotation HKDF
pub const ROTATION_SALT_LEN: usize = 32;

/// 256-bit symmetric key, zeroized on drop.
///
/// Not `Clone`: a key belongs to exactly one profile.
pub struct SymmetricKey {
    inner: Secret<[u8; KEY_LEN]>,
}

impl SymmetricKey {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            inner: Secret::new(bytes),
        }
    }

    /// Load a key persisted by the secure store
    pub fn from_slice(bytes: &[u8]) -> VaultResult<Self> {
        if bytes.len() != KEY_LEN {
            return Err(VaultError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: bytes.len(),
            });
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(bytes);
        Ok(Self::from_bytes(key))
    }

    /// Expose the key bytes (use with caution)
    pub fn expose(&self) -> &[u8; KEY_LEN] {
        self.inner.expose_secret()
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey([REDACTED])")
    }
}

/// Fill `buf` from the OS CSPRNG
pub fn fill_random(buf: &mut [u8]) -> VaultResult<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| VaultError::RandomSourceFailed(e.to_string()))
}

/// Generate a random 96-bit nonce
pub fn generate_nonce() -> VaultResult<[u8; NONCE_LEN]> {
    let mut nonce = [0u8; NONCE_LEN];
    fill_random(&mut nonce)?;
    Ok(nonce)
}

/// Generate a random PIN-hash salt
pub fn generate_salt() -> VaultResult<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    fill_random(&mut salt)?;
    Ok(salt)
}
