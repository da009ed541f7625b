//! # ALFA Vault Engine
//!
//! Key lifecycle, authenticated encryption and constant-time multi-profile
//! PIN routing for an on-device private vault.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    ALFA VAULT ENGINE                     │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────┐  │
//! │  │ AUTH ROUTER │─▶│   SWITCH    │─▶│  CIPHER ENGINE  │  │
//! │  │ PBKDF2 × 3  │  │ CONTROLLER  │  │ ChaCha20 / AES  │  │
//! │  └──────┬──────┘  └──────┬──────┘  └─────────────────┘  │
//! │         │                │                               │
//! │  ┌──────┴──────┐  ┌──────┴──────┐  ┌─────────────────┐  │
//! │  │  LOCKOUT    │  │ KEY MANAGER │  │ SECURE KEYSTORE │  │
//! │  │             │  │ entropy/HKDF│  │ (collaborator)  │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! - Three profiles: primary, decoy and optional duress
//! - Every PIN attempt derives and compares all three slots
//! - Blobs are `nonce || ciphertext || tag`, 28 bytes of overhead
//! - Keys rotate through HKDF-SHA256 with a fresh salt
//! - Key and PIN buffers are zeroized on drop

pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod events;
pub mod integrity;
pub mod key_manager;
pub mod lockout;
pub mod profile;
pub mod rotation;
pub mod router;
pub mod store;
pub mod switch;

pub use config::EngineConfig;
pub use crypto::{CipherEngine, CipherSuite, EncryptedBlob, KeyStrength, PasswordKdf, SymmetricKey};
pub use engine::{EngineBuilder, EnrollmentPins, VaultEngine};
pub use error::{VaultError, VaultResult};
pub use events::{SecurityEvent, SecurityEventSink, TracingEventSink};
pub use integrity::{Advice, IntegrityAdvisor, NoopAdvisor};
pub use key_manager::{EntropySource, KeyManager, OsEntropy};
pub use lockout::{LockoutPolicy, LockoutState};
pub use profile::{ProfileConfig, ProfileId};
pub use rotation::{KeyRotationMetadata, RotationPolicy};
pub use router::{AuthOutcome, AuthRouter, Evaluation};
pub use store::{FileKeyStore, MemoryKeyStore, SecureKeyStore};
pub use switch::{ActiveProfile, DecoyAsset, SealedAsset, VaultSwitchController};

/// ALFA Vault Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
