//! Vault profiles and the immutable PIN configuration the router evaluates.

use serde::{Deserialize, Serialize};

use crate::crypto::kdf::PinHash;
use crate::crypto::keys::SymmetricKey;
use crate::error::{VaultError, VaultResult};
use crate::rotation::KeyRotationMetadata;

/// Profile identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileId {
    /// The real vault
    Primary,
    /// Plausible non-sensitive content shown under the decoy PIN
    Decoy,
    /// Entered under coercion
    Duress,
}

impl ProfileId {
    pub const ALL: [ProfileId; 3] = [ProfileId::Primary, ProfileId::Decoy, ProfileId::Duress];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Decoy => "decoy",
            Self::Duress => "duress",
        }
    }

    /// Whether a vault may exist without this profile
    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Duress)
    }
}

impl std::fmt::Display for ProfileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A profile with its key, verifier and rotation record
pub struct VaultProfile {
    pub id: ProfileId,
    pub key: SymmetricKey,
    pub pin_hash: PinHash,
    pub rotation: KeyRotationMetadata,
}

impl std::fmt::Debug for VaultProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultProfile")
            .field("id", &self.id)
            .field("version", &self.rotation.version)
            .finish_non_exhaustive()
    }
}

/// PIN verifiers for every configured profile.
///
/// Immutable: changes produce a new value via the `with_*`/`without_*`
/// methods, which the engine then persists.
#[derive(Debug, Clone)]
pub struct ProfileConfig {
    primary: PinHash,
    decoy: PinHash,
    duress: Option<PinHash>,
}

impl ProfileConfig {
    pub fn new(primary: PinHash, decoy: PinHash, duress: Option<PinHash>) -> VaultResult<Self> {
        let config = Self {
            primary,
            decoy,
            duress,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> VaultResult<()> {
        let hashes: Vec<&PinHash> = self.iter().map(|(_, h)| h).collect();

        for hash in &hashes {
            hash.ensure_supported()?;
        }

        // uniform cost across profiles
        let iterations = self.primary.iterations;
        if hashes.iter().any(|h| h.iterations != iterations) {
            return Err(VaultError::InvalidConfig(
                "all profiles must use the same iteration count".into(),
            ));
        }

        for (i, a) in hashes.iter().enumerate() {
            for b in &hashes[i + 1..] {
                if a.hash == b.hash || a.salt == b.salt {
                    return Err(VaultError::InvalidConfig(
                        "profile verifiers must be distinct".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, id: ProfileId) -> Option<&PinHash> {
        match id {
            ProfileId::Primary => Some(&self.primary),
            ProfileId::Decoy => Some(&self.decoy),
            ProfileId::Duress => self.duress.as_ref(),
        }
    }

    /// Configured profiles in slot order
    pub fn iter(&self) -> impl Iterator<Item = (ProfileId, &PinHash)> {
        ProfileId::ALL
            .into_iter()
            .filter_map(move |id| self.get(id).map(|h| (id, h)))
    }

    pub fn has_duress(&self) -> bool {
        self.duress.is_some()
    }

    /// Shared iteration count
    pub fn iterations(&self) -> u32 {
        self.primary.iterations
    }

    /// New configuration with a duress verifier
    pub fn with_duress(&self, duress: PinHash) -> VaultResult<Self> {
        Self::new(self.primary.clone(), self.decoy.clone(), Some(duress))
    }

    /// New configuration without the duress profile
    pub fn without_duress(&self) -> Self {
        Self {
            primary: self.primary.clone(),
            decoy: self.decoy.clone(),
            duress: None,
        }
    }
}
