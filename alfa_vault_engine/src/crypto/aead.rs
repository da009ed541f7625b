//! ALFA Vault Engine - AEAD Encryption
//!
//! ChaCha20-Poly1305 by default, AES-256-GCM selectable. Both use a 96-bit
//! random nonce and a 128-bit tag, so a blob is always
//! `nonce(12) || ciphertext(N) || tag(16)`.

use aes_gcm::Aes256Gcm;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::keys::{generate_nonce, SymmetricKey, NONCE_LEN, TAG_LEN};
use crate::error::{VaultError, VaultResult};

/// Fixed per-blob overhead
pub const BLOB_OVERHEAD: usize = NONCE_LEN + TAG_LEN;

/// AEAD algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CipherSuite {
    #[default]
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
}

impl CipherSuite {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChaCha20Poly1305 => "ChaCha20-Poly1305",
            Self::Aes256Gcm => "AES-256-GCM",
        }
    }
}

/// Sealed payload: `nonce || ciphertext || tag`
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    bytes: Vec<u8>,
}

impl EncryptedBlob {
    /// Parse a persisted blob
    pub fn from_bytes(bytes: Vec<u8>) -> VaultResult<Self> {
        if bytes.len() < BLOB_OVERHEAD {
            return Err(VaultError::InvalidBlob(format!(
                "{} bytes is shorter than the {} byte envelope",
                bytes.len(),
                BLOB_OVERHEAD
            )));
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn nonce(&self) -> &[u8] {
        &self.bytes[..NONCE_LEN]
    }

    /// Ciphertext followed by the tag
    fn sealed(&self) -> &[u8] {
        &self.bytes[NONCE_LEN..]
    }

    /// Plaintext length carried by this blob
    pub fn payload_len(&self) -> usize {
        self.bytes.len() - BLOB_OVERHEAD
    }
}

impl std::fmt::Debug for EncryptedBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedBlob")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Stateless AEAD engine
#[derive(Debug, Clone, Copy, Default)]
pub struct CipherEngine {
    suite: CipherSuite,
}

impl CipherEngine {
    pub fn new(suite: CipherSuite) -> Self {
        Self { suite }
    }

    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    /// Encrypt under a fresh random nonce
    pub fn encrypt(&self, plaintext: &[u8], key: &SymmetricKey) -> VaultResult<EncryptedBlob> {
        let nonce_bytes = generate_nonce()?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = match self.suite {
            CipherSuite::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key.expose())
                .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?
                .encrypt(nonce, plaintext),
            CipherSuite::Aes256Gcm => Aes256Gcm::new_from_slice(key.expose())
                .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?
                .encrypt(nonce, plaintext),
        }
        .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

        let mut bytes = Vec::with_capacity(NONCE_LEN + sealed.len());
        bytes.extend_from_slice(&nonce_bytes);
        bytes.extend_from_slice(&sealed);

        Ok(EncryptedBlob { bytes })
    }

    /// Verify the tag and decrypt. No plaintext is released on failure.
    pub fn decrypt(&self, blob: &EncryptedBlob, key: &SymmetricKey) -> VaultResult<Zeroizing<Vec<u8>>> {
        let nonce = Nonce::from_slice(blob.nonce());

        let plaintext = match self.suite {
            CipherSuite::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key.expose())
                .map_err(|_| VaultError::AuthenticationFailed)?
                .decrypt(nonce, blob.sealed()),
            CipherSuite::Aes256Gcm => Aes256Gcm::new_from_slice(key.expose())
                .map_err(|_| VaultError::AuthenticationFailed)?
                .decrypt(nonce, blob.sealed()),
        }
        .map_err(|_| VaultError::AuthenticationFailed)?;

        Ok(Zeroizing::new(plaintext))
    }

    /// Decrypt under `old_key` and re-seal under `new_key`.
    ///
    /// The intermediate plaintext is zeroized on every path.
    pub fn reencrypt(
        &self,
        blob: &EncryptedBlob,
        old_key: &SymmetricKey,
        new_key: &SymmetricKey,
    ) -> VaultResult<EncryptedBlob> {
        let plaintext = self.decrypt(blob, old_key)?;
        self.encrypt(&plaintext, new_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn key(byte: u8) -> SymmetricKey {
        SymmetricKey::from_bytes([byte; 32])
    }

    #[test]
    fn test_hello_world_layout() {
        let engine = CipherEngine::default();
        let k = key(1);

        let blob = engine.encrypt(b"Hello, World!", &k).unwrap();
        assert_eq!(blob.len(), 41);
        assert_eq!(blob.payload_len(), 13);

        let plain = engine.decrypt(&blob, &k).unwrap();
        assert_eq!(plain.as_slice(), b"Hello, World!");
    }

    #[test]
    fn test_roundtrip_sizes_both_suites() {
        for suite in [CipherSuite::ChaCha20Poly1305, CipherSuite::Aes256Gcm] {
            let engine = CipherEngine::new(suite);
            let k = key(2);
            for size in [0usize, 1, 15, 16, 17, 4096, 65_537] {
                let data: Vec<u8> = (0..size).map(|i| (i * 31 % 251) as u8).collect();
                let blob = engine.encrypt(&data, &k).unwrap();
                assert_eq!(blob.len(), size + BLOB_OVERHEAD, "{} size {}", suite.name(), size);
                assert_eq!(engine.decrypt(&blob, &k).unwrap().as_slice(), data.as_slice());
            }
        }
    }

    #[test]
    fn test_ten_megabyte_payload() {
        let engine = CipherEngine::default();
        let k = key(3);
        let data = vec![0xA5u8; 10 * 1024 * 1024];

        let blob = engine.encrypt(&data, &k).unwrap();
        assert_eq!(blob.len() - data.len(), BLOB_OVERHEAD);
        assert!(engine.decrypt(&blob, &k).unwrap().as_slice() == data.as_slice());
    }

    #[test]
    fn test_empty_plaintext_still_authenticated() {
        let engine = CipherEngine::default();
        let k = key(4);
        let blob = engine.encrypt(b"", &k).unwrap();
        assert_eq!(blob.len(), BLOB_OVERHEAD);
        assert!(engine.decrypt(&blob, &k).unwrap().is_empty());

        let mut bytes = blob.into_bytes();
        bytes[NONCE_LEN] ^= 0x01;
        let tampered = EncryptedBlob::from_bytes(bytes).unwrap();
        assert!(matches!(
            engine.decrypt(&tampered, &k),
            Err(VaultError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_every_bit_flip_detected() {
        for suite in [CipherSuite::ChaCha20Poly1305, CipherSuite::Aes256Gcm] {
            let engine = CipherEngine::new(suite);
            let k = key(5);
            let blob = engine.encrypt(b"tamper me", &k).unwrap();

            for bit in 0..blob.len() * 8 {
                let mut bytes = blob.as_bytes().to_vec();
                bytes[bit / 8] ^= 1 << (bit % 8);
                let tampered = EncryptedBlob::from_bytes(bytes).unwrap();
                assert!(
                    engine.decrypt(&tampered, &k).is_err(),
                    "{}: bit {} flip undetected",
                    suite.name(),
                    bit
                );
            }
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let engine = CipherEngine::default();
        let blob = engine.encrypt(b"Secret data", &key(6)).unwrap();
        for other in [0u8, 7, 0xFF] {
            assert!(matches!(
                engine.decrypt(&blob, &key(other)),
                Err(VaultError::AuthenticationFailed)
            ));
        }
    }

    #[test]
    fn test_suites_not_interchangeable() {
        let k = key(8);
        let blob = CipherEngine::new(CipherSuite::Aes256Gcm).encrypt(b"x", &k).unwrap();
        assert!(CipherEngine::new(CipherSuite::ChaCha20Poly1305).decrypt(&blob, &k).is_err());
    }

    #[test]
    fn test_nonce_uniqueness() {
        let engine = CipherEngine::default();
        let k = key(9);
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let blob = engine.encrypt(b"same plaintext", &k).unwrap();
            assert!(seen.insert(blob.into_bytes()));
        }
        assert_eq!(seen.len(), 10_000);
    }

    #[test]
    fn test_reencrypt() {
        let engine = CipherEngine::default();
        let (old, new) = (key(10), key(11));
        let blob = engine.encrypt(b"photo bytes", &old).unwrap();

        let moved = engine.reencrypt(&blob, &old, &new).unwrap();
        assert_eq!(engine.decrypt(&moved, &new).unwrap().as_slice(), b"photo bytes");
        assert!(engine.decrypt(&moved, &old).is_err());

        // wrong old key fails without producing a blob
        assert!(matches!(
            engine.reencrypt(&blob, &new, &old),
            Err(VaultError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_short_blob_rejected() {
        assert!(matches!(
            EncryptedBlob::from_bytes(vec![0u8; BLOB_OVERHEAD - 1]),
            Err(VaultError::InvalidBlob(_))
        ));
    }
}
