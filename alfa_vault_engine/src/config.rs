//! ALFA Vault Engine - Engine Configuration
//!
//! Stored as a JSON document next to the vault. Values are immutable once
//! built; the `with_*` builders return a new, validated configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::crypto::aead::CipherSuite;
use crate::crypto::kdf::MIN_ROUNDS;
use crate::error::{VaultError, VaultResult};
use crate::lockout::{LockoutPolicy, MAX_LOCKOUT_SECONDS};
use crate::rotation::{RotationPolicy, MAX_ROTATION_INTERVAL_DAYS};

/// Default HKDF info string for key rotation
pub const DEFAULT_ROTATION_CONTEXT: &str = "vault_rotation";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// AEAD used for every blob
    pub cipher_suite: CipherSuite,
    /// PBKDF2 rounds for PIN verifiers
    pub kdf_rounds: u32,
    /// HKDF info for key rotation
    pub rotation_context: String,
    /// Rotation schedule
    pub rotation_policy: RotationPolicy,
    /// Failed-attempt lockout
    pub lockout: LockoutPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cipher_suite: CipherSuite::default(),
            kdf_rounds: MIN_ROUNDS,
            rotation_context: DEFAULT_ROTATION_CONTEXT.into(),
            rotation_policy: RotationPolicy::default(),
            lockout: LockoutPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Check invariants
    pub fn validate(&self) -> VaultResult<()> {
        if self.kdf_rounds < MIN_ROUNDS {
            return Err(VaultError::InvalidConfig(format!(
                "kdf_rounds must be at least {}",
                MIN_ROUNDS
            )));
        }
        if self.rotation_context.is_empty() {
            return Err(VaultError::InvalidConfig(
                "rotation_context must not be empty".into(),
            ));
        }
        let interval = self.rotation_policy.rotation_interval_days;
        if interval == 0 || interval > MAX_ROTATION_INTERVAL_DAYS {
            return Err(VaultError::InvalidConfig(format!(
                "rotation_interval_days must be between 1 and {}",
                MAX_ROTATION_INTERVAL_DAYS
            )));
        }
        if self.rotation_policy.warning_days > interval {
            return Err(VaultError::InvalidConfig(
                "warning_days must not exceed rotation_interval_days".into(),
            ));
        }
        if self.lockout.lockout_seconds > MAX_LOCKOUT_SECONDS {
            return Err(VaultError::InvalidConfig(format!(
                "lockout_seconds must be at most {}",
                MAX_LOCKOUT_SECONDS
            )));
        }
        Ok(())
    }

    /// Load and validate a configuration file
    pub fn load(path: &Path) -> VaultResult<Self> {
        let data = fs::read(path)?;
        let config: Self = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or the defaults if it does not exist
    pub fn load_or_default(path: &Path) -> VaultResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save as pretty JSON
    pub fn save(&self, path: &Path) -> VaultResult<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn with_cipher_suite(&self, suite: CipherSuite) -> Self {
        Self {
            cipher_suite: suite,
            ..self.clone()
        }
    }

    pub fn with_kdf_rounds(&self, rounds: u32) -> VaultResult<Self> {
        let config = Self {
            kdf_rounds: rounds,
            ..self.clone()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_lockout(&self, lockout: LockoutPolicy) -> Self {
        Self {
            lockout,
            ..self.clone()
        }
    }

    pub fn with_rotation_policy(&self, policy: RotationPolicy) -> VaultResult<Self> {
        let config = Self {
            rotation_policy: policy,
            ..self.clone()
        };
        config.validate()?;
        Ok(config)
    }
}
