//! ALFA Vault Engine - Profile Switch Controller
//!
//! Binds cipher operations to the key of whichever profile the last
//! evaluation selected, and keeps profiles from touching each other.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::aead::{CipherEngine, EncryptedBlob};
use crate::crypto::keys::SymmetricKey;
use crate::error::{VaultError, VaultResult};
use crate::key_manager::KeyManager;
use crate::profile::{ProfileId, VaultProfile};
use crate::rotation::KeyRotationMetadata;
use crate::router::{AuthOutcome, Evaluation};

/// The profile bound for the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveProfile {
    pub id: ProfileId,
    pub since: DateTime<Utc>,
}

/// Plaintext asset destined for the decoy profile
pub struct DecoyAsset {
    pub name: String,
    pub data: Zeroizing<Vec<u8>>,
}

impl DecoyAsset {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data: Zeroizing::new(data),
        }
    }
}

/// Asset sealed under a profile key
#[derive(Debug, Clone)]
pub struct SealedAsset {
    pub id: Uuid,
    pub name: String,
    pub blob: EncryptedBlob,
}

/// Rotated key and re-encrypted blobs awaiting installation
pub struct PendingRotation {
    id: ProfileId,
    key: SymmetricKey,
    metadata: KeyRotationMetadata,
    blobs: Vec<EncryptedBlob>,
}

impl PendingRotation {
    pub fn profile(&self) -> ProfileId {
        self.id
    }

    pub fn key(&self) -> &SymmetricKey {
        &self.key
    }

    pub fn metadata(&self) -> &KeyRotationMetadata {
        &self.metadata
    }

    pub fn blobs(&self) -> &[EncryptedBlob] {
        &self.blobs
    }
}

/// Session-scoped profile binding
pub struct VaultSwitchController {
    cipher: CipherEngine,
    profiles: HashMap<ProfileId, VaultProfile>,
    active: Option<ActiveProfile>,
}

impl VaultSwitchController {
    /// Requires a Primary and a Decoy profile; Duress is optional
    pub fn new(cipher: CipherEngine, profiles: Vec<VaultProfile>) -> VaultResult<Self> {
        let mut map = HashMap::with_capacity(profiles.len());
        for profile in profiles {
            let id = profile.id;
            if map.insert(id, profile).is_some() {
                return Err(VaultError::InvalidConfig(format!("duplicate {} profile", id)));
            }
        }
        for required in [ProfileId::Primary, ProfileId::Decoy] {
            if !map.contains_key(&required) {
                return Err(VaultError::InvalidConfig(format!("missing {} profile", required)));
            }
        }

        Ok(Self {
            cipher,
            profiles: map,
            active: None,
        })
    }

    /// Bind the session to the evaluated profile.
    ///
    /// `Denied` ends any current session and yields no profile.
    pub fn activate(&mut self, evaluation: Evaluation) -> Option<ActiveProfile> {
        let selected = match evaluation.outcome() {
            AuthOutcome::PrimaryUnlock => Some(ProfileId::Primary),
            AuthOutcome::DecoyUnlock => Some(ProfileId::Decoy),
            AuthOutcome::DuressUnlock => Some(ProfileId::Duress),
            AuthOutcome::Denied => None,
        };

        self.active = selected
            .filter(|id| self.profiles.contains_key(id))
            .map(|id| ActiveProfile {
                id,
                since: Utc::now(),
            });
        self.active
    }

    pub fn active(&self) -> Option<ActiveProfile> {
        self.active
    }

    /// End the session
    pub fn lock(&mut self) {
        self.active = None;
    }

    pub fn has_profile(&self, id: ProfileId) -> bool {
        self.profiles.contains_key(&id)
    }

    pub fn rotation_metadata(&self, id: ProfileId) -> Option<&KeyRotationMetadata> {
        self.profiles.get(&id).map(|p| &p.rotation)
    }

    fn active_profile(&self) -> VaultResult<&VaultProfile> {
        self.active
            .and_then(|a| self.profiles.get(&a.id))
            .ok_or(VaultError::NoActiveProfile)
    }

    pub(crate) fn active_key(&self) -> VaultResult<&SymmetricKey> {
        self.active_profile().map(|p| &p.key)
    }

    /// Encrypt under the active profile's key
    pub fn seal(&self, plaintext: &[u8]) -> VaultResult<EncryptedBlob> {
        self.cipher.encrypt(plaintext, self.active_key()?)
    }

    /// Decrypt under the active profile's key
    pub fn open(&self, blob: &EncryptedBlob) -> VaultResult<Zeroizing<Vec<u8>>> {
        self.cipher.decrypt(blob, self.active_key()?)
    }

    /// Seal assets into the decoy profile.
    ///
    /// Only a Primary session may do this; a decoy or duress session must not
    /// be able to write to, or learn about, the decoy's real contents.
    pub fn populate_decoy(&self, assets: Vec<DecoyAsset>) -> VaultResult<Vec<SealedAsset>> {
        match self.active.map(|a| a.id) {
            Some(ProfileId::Primary) => {}
            Some(ProfileId::Decoy) | Some(ProfileId::Duress) | None => {
                return Err(VaultError::NotPermitted);
            }
        }

        let decoy = self
            .profiles
            .get(&ProfileId::Decoy)
            .ok_or(VaultError::NotPermitted)?;

        assets
            .into_iter()
            .map(|asset| -> VaultResult<SealedAsset> {
                Ok(SealedAsset {
                    id: Uuid::new_v4(),
                    blob: self.cipher.encrypt(&asset.data, &decoy.key)?,
                    name: asset.name,
                })
            })
            .collect()
    }

    /// Derive the active profile's next key and re-encrypt `blobs` under it,
    /// without installing it yet.
    ///
    /// If any blob fails nothing is returned and the current key stays.
    pub fn prepare_rotation(
        &self,
        keys: &KeyManager,
        context: &str,
        blobs: &[EncryptedBlob],
    ) -> VaultResult<PendingRotation> {
        let profile = self.active_profile()?;
        let (key, metadata) = keys.rotate(&profile.key, context, &profile.rotation)?;

        let blobs = blobs
            .iter()
            .map(|blob| self.cipher.reencrypt(blob, &profile.key, &key))
            .collect::<VaultResult<Vec<_>>>()?;

        Ok(PendingRotation {
            id: profile.id,
            key,
            metadata,
            blobs,
        })
    }

    /// Install a prepared rotation; the replaced key is zeroized on drop.
    pub fn commit_rotation(
        &mut self,
        pending: PendingRotation,
    ) -> VaultResult<(Vec<EncryptedBlob>, KeyRotationMetadata)> {
        let PendingRotation {
            id,
            key,
            metadata,
            blobs,
        } = pending;

        let profile = self.profiles.get_mut(&id).ok_or(VaultError::NoActiveProfile)?;
        profile.key = key;
        profile.rotation = metadata.clone();
        Ok((blobs, metadata))
    }

    /// Rotate the active profile's key and re-encrypt `blobs` under it.
    ///
    /// All-or-nothing: if any blob fails to re-encrypt the old key stays in
    /// place.
    pub fn rotate_active(
        &mut self,
        keys: &KeyManager,
        context: &str,
        blobs: &[EncryptedBlob],
    ) -> VaultResult<(Vec<EncryptedBlob>, KeyRotationMetadata)> {
        let pending = self.prepare_rotation(keys, context, blobs)?;
        let (moved, metadata) = self.commit_rotation(pending)?;
        keys.rotation_committed(&metadata);
        Ok((moved, metadata))
    }

    /// Remove a non-primary profile; its key and verifier are zeroized.
    pub fn disable(&mut self, id: ProfileId) -> VaultResult<()> {
        if !id.is_optional() {
            return Err(VaultError::NotPermitted);
        }

        if self.active.map(|a| a.id) == Some(id) {
            self.lock();
        }
        drop(self.profiles.remove(&id));
        Ok(())
    }
}
