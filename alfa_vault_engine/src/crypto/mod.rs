//! ALFA Vault Engine - Cryptographic Core
//!
//! Leaf primitives: key material, entropy gate, PIN stretching, HKDF,
//! constant-time comparison and the AEAD engine.

pub mod keys;
pub mod entropy;
pub mod kdf;
pub mod hkdf;
pub mod compare;
pub mod aead;

pub use keys::*;
pub use entropy::{KeyStrength, StrengthRating, MIN_KEY_ENTROPY};
pub use kdf::{PasswordKdf, PinHash, PinHashAlgorithm, MIN_ROUNDS};
pub use self::hkdf::derive_subkey;
pub use compare::{ct_eq, ct_eq_mask};
pub use aead::{CipherEngine, CipherSuite, EncryptedBlob, BLOB_OVERHEAD};
