//! ALFA Vault Engine - HKDF Key Derivation
//!
//! Extract-and-expand derivation used for key rotation.

use hkdf::Hkdf;
use sha2::Sha256;

use super::keys::{SymmetricKey, KEY_LEN};
use crate::error::{VaultError, VaultResult};

/// Derive a subkey from a parent key with salt and domain-separation info
pub fn derive_subkey(parent: &SymmetricKey, salt: &[u8], info: &[u8]) -> VaultResult<SymmetricKey> {
    let hk = Hkdf::<Sha256>::new(Some(salt), parent.expose());
    let mut okm = zeroize::Zeroizing::new([0u8; KEY_LEN]);

    hk.expand(info, &mut *okm)
        .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;

    Ok(SymmetricKey::from_bytes(*okm))
}
