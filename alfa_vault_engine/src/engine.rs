//! ALFA Vault Engine - Engine Context
//!
//! Owns every component for one vault and is the only thing callers need to
//! hold. There is no global state: build as many engines as there are vaults.
//!
//! Key material lives in the [`SecureKeyStore`] under these tags:
//!
//! ```text
//! alfa.vault.<profile>.key       raw 32-byte key
//! alfa.vault.<profile>.pin       PIN verifier (JSON)
//! alfa.vault.<profile>.rotation  rotation metadata (JSON)
//! alfa.vault.<profile>.key.next  rotated key awaiting promotion
//! alfa.vault.lockout             failed-attempt state (JSON)
//! ```
//!
//! Locks are always taken in the order router, switch, lockout.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::config::EngineConfig;
use crate::crypto::aead::{CipherEngine, EncryptedBlob};
use crate::crypto::compare::ct_eq;
use crate::crypto::kdf::{PasswordKdf, PinHash};
use crate::crypto::keys::SymmetricKey;
use crate::error::{VaultError, VaultResult};
use crate::events::{SecurityEventSink, TracingEventSink};
use crate::integrity::{Advice, IntegrityAdvisor, NoopAdvisor};
use crate::key_manager::{EntropySource, KeyManager, OsEntropy};
use crate::lockout::{LockoutState, LockoutTracker};
use crate::profile::{ProfileConfig, ProfileId, VaultProfile};
use crate::rotation::KeyRotationMetadata;
use crate::router::AuthRouter;
use crate::store::SecureKeyStore;
use crate::switch::{ActiveProfile, DecoyAsset, PendingRotation, SealedAsset, VaultSwitchController};

/// Store tag for one profile record
pub fn store_tag(profile: ProfileId, kind: &str) -> String {
    format!("alfa.vault.{}.{}", profile, kind)
}

const KEY: &str = "key";
const PIN: &str = "pin";
const ROTATION: &str = "rotation";
const KEY_NEXT: &str = "key.next";

/// Store tag for the lockout state
pub const LOCKOUT_TAG: &str = "alfa.vault.lockout";

/// PINs supplied at enrollment
pub struct EnrollmentPins {
    pub primary: SecretString,
    pub decoy: SecretString,
    pub duress: Option<SecretString>,
}

impl EnrollmentPins {
    fn iter(&self) -> impl Iterator<Item = (ProfileId, &SecretString)> {
        [
            (ProfileId::Primary, Some(&self.primary)),
            (ProfileId::Decoy, Some(&self.decoy)),
            (ProfileId::Duress, self.duress.as_ref()),
        ]
        .into_iter()
        .filter_map(|(id, pin)| pin.map(|p| (id, p)))
    }

    fn ensure_distinct(&self) -> VaultResult<()> {
        let pins: Vec<&[u8]> = self.iter().map(|(_, p)| p.expose_secret().as_bytes()).collect();
        for (i, a) in pins.iter().enumerate() {
            if pins[i + 1..].iter().any(|b| ct_eq(a, b)) {
                return Err(VaultError::InvalidConfig(
                    "each profile needs its own PIN".into(),
                ));
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// BUILDER
// ═══════════════════════════════════════════════════════════════════════════

/// Collaborators for a [`VaultEngine`]; finish with `enroll` or `load`
pub struct EngineBuilder {
    config: EngineConfig,
    store: Arc<dyn SecureKeyStore>,
    events: Arc<dyn SecurityEventSink>,
    advisor: Arc<dyn IntegrityAdvisor>,
    entropy: Arc<dyn EntropySource>,
    kdf: PasswordKdf,
}

impl EngineBuilder {
    /// Create new builder with default configuration
    pub fn new(store: Arc<dyn SecureKeyStore>) -> Self {
        Self {
            config: EngineConfig::default(),
            store,
            events: Arc::new(TracingEventSink),
            advisor: Arc::new(NoopAdvisor),
            entropy: Arc::new(OsEntropy),
            kdf: PasswordKdf::new(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn events(mut self, events: Arc<dyn SecurityEventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn advisor(mut self, advisor: Arc<dyn IntegrityAdvisor>) -> Self {
        self.advisor = advisor;
        self
    }

    pub fn entropy_source(mut self, entropy: Arc<dyn EntropySource>) -> Self {
        self.entropy = entropy;
        self
    }

    /// Create a vault: one fresh key and PIN verifier per profile.
    ///
    /// Fails if the store already holds a primary key. A failed write
    /// removes whatever was already stored, so enrollment can be retried.
    pub fn enroll(self, pins: &EnrollmentPins) -> VaultResult<VaultEngine> {
        self.config.validate()?;
        pins.ensure_distinct()?;

        if self.store.get(&store_tag(ProfileId::Primary, KEY))?.is_some() {
            return Err(VaultError::InvalidConfig("vault already enrolled".into()));
        }

        let keys = KeyManager::new(self.entropy.clone(), self.events.clone());
        let rounds = self.config.kdf_rounds;

        let mut profiles = Vec::with_capacity(3);
        for (id, pin) in pins.iter() {
            profiles.push(VaultProfile {
                id,
                key: keys.generate()?,
                pin_hash: self.kdf.hash_pin(pin, rounds)?,
                rotation: keys.initial_metadata(self.kdf.effective_rounds(rounds)),
            });
        }

        let persisted = profiles
            .iter()
            .try_for_each(|profile| persist_profile(self.store.as_ref(), profile));
        if let Err(err) = persisted {
            tracing::warn!(error = %err, "enrollment rolled back");
            for id in ProfileId::ALL {
                discard_profile(self.store.as_ref(), id);
            }
            return Err(err);
        }

        tracing::info!(
            suite = self.config.cipher_suite.name(),
            rounds,
            "vault enrolled"
        );
        self.assemble(keys, profiles)
    }

    /// Open an enrolled vault from the store
    pub fn load(self) -> VaultResult<VaultEngine> {
        self.config.validate()?;

        let mut profiles = Vec::with_capacity(3);
        for id in ProfileId::ALL {
            match load_profile(self.store.as_ref(), id)? {
                Some(profile) => profiles.push(profile),
                None if id.is_optional() => {}
                None => {
                    return Err(VaultError::InvalidConfig(format!("{} profile not enrolled", id)));
                }
            }
        }

        let keys = KeyManager::new(self.entropy.clone(), self.events.clone());
        tracing::debug!(profiles = profiles.len(), "vault loaded");
        self.assemble(keys, profiles)
    }

    fn assemble(self, keys: KeyManager, profiles: Vec<VaultProfile>) -> VaultResult<VaultEngine> {
        let pin = |id: ProfileId| profiles.iter().find(|p| p.id == id).map(|p| p.pin_hash.clone());
        let required = |id: ProfileId| {
            pin(id).ok_or_else(|| VaultError::InvalidConfig(format!("missing {} profile", id)))
        };
        let profile_config = ProfileConfig::new(
            required(ProfileId::Primary)?,
            required(ProfileId::Decoy)?,
            pin(ProfileId::Duress),
        )?;

        let router = AuthRouter::with_kdf(self.kdf, profile_config, self.events.clone())?;
        let saved: LockoutState = match self.store.get(LOCKOUT_TAG)? {
            Some(state) => serde_json::from_slice(&state)?,
            None => LockoutState::default(),
        };
        let lockout = LockoutTracker::resume(self.config.lockout.clone(), saved, router.failed_attempts());
        let cipher = CipherEngine::new(self.config.cipher_suite);
        let switch = VaultSwitchController::new(cipher, profiles)?;

        Ok(VaultEngine {
            config: self.config,
            keys,
            store: self.store,
            advisor: self.advisor,
            router: RwLock::new(router),
            switch: RwLock::new(switch),
            lockout: Mutex::new(lockout),
        })
    }
}

fn persist_profile(store: &dyn SecureKeyStore, profile: &VaultProfile) -> VaultResult<()> {
    let pin = Zeroizing::new(serde_json::to_vec(&profile.pin_hash)?);
    store.put(&store_tag(profile.id, KEY), profile.key.expose())?;
    store.put(&store_tag(profile.id, PIN), &pin)?;
    store.put(
        &store_tag(profile.id, ROTATION),
        &serde_json::to_vec(&profile.rotation)?,
    )?;
    Ok(())
}

/// Best-effort removal of every record of `id`
fn discard_profile(store: &dyn SecureKeyStore, id: ProfileId) {
    for kind in [KEY, PIN, ROTATION, KEY_NEXT] {
        if let Err(err) = store.delete(&store_tag(id, kind)) {
            tracing::warn!(error = %err, "stale record left in store");
        }
    }
}

fn load_profile(store: &dyn SecureKeyStore, id: ProfileId) -> VaultResult<Option<VaultProfile>> {
    let key = match store.get(&store_tag(id, KEY))? {
        Some(key) => SymmetricKey::from_slice(&key)?,
        None => return Ok(None),
    };
    let missing = |kind: &str| VaultError::StorageUnavailable(format!("missing {}", store_tag(id, kind)));

    let pin = store.get(&store_tag(id, PIN))?.ok_or_else(|| missing(PIN))?;
    let pin_hash: PinHash = serde_json::from_slice(&pin)?;
    pin_hash.ensure_supported()?;

    let rotation = store
        .get(&store_tag(id, ROTATION))?
        .ok_or_else(|| missing(ROTATION))?;
    let rotation: KeyRotationMetadata = serde_json::from_slice(&rotation)?;

    Ok(Some(VaultProfile {
        id,
        key,
        pin_hash,
        rotation,
    }))
}

// ═══════════════════════════════════════════════════════════════════════════
// ENGINE
// ═══════════════════════════════════════════════════════════════════════════

/// One vault's authentication, session and cipher operations
pub struct VaultEngine {
    config: EngineConfig,
    keys: KeyManager,
    store: Arc<dyn SecureKeyStore>,
    advisor: Arc<dyn IntegrityAdvisor>,
    router: RwLock<AuthRouter>,
    switch: RwLock<VaultSwitchController>,
    lockout: Mutex<LockoutTracker>,
}

impl VaultEngine {
    pub fn builder(store: Arc<dyn SecureKeyStore>) -> EngineBuilder {
        EngineBuilder::new(store)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn key_manager(&self) -> &KeyManager {
        &self.keys
    }

    /// Evaluate `pin` and bind the session to the matching profile.
    ///
    /// `Ok(None)` is a denial. The result looks the same for every profile;
    /// only the data later decrypted differs.
    pub fn unlock(&self, pin: &SecretString) -> VaultResult<Option<ActiveProfile>> {
        let router = self.router.read();
        self.lockout.lock().check(router.failed_attempts())?;

        let evaluation = router.evaluate(pin);
        let denied = evaluation.is_denied();
        let (active, rotation) = {
            let mut switch = self.switch.write();
            let active = switch.activate(evaluation);
            let rotation = active.and_then(|a| switch.rotation_metadata(a.id).cloned());
            (active, rotation)
        };

        let failed = router.failed_attempts();
        let verdict = {
            let mut lockout = self.lockout.lock();
            let verdict = if denied {
                lockout.record_failure(failed)
            } else {
                lockout.record_success(failed);
                Ok(())
            };
            self.save_lockout(&lockout.state(failed))?;
            verdict
        };
        verdict?;
        if denied {
            return Ok(None);
        }

        if let Some(meta) = rotation {
            if self.config.rotation_policy.is_due(&meta) {
                tracing::warn!(version = meta.version, "key rotation due");
            }
        }
        Ok(active)
    }

    fn save_lockout(&self, state: &LockoutState) -> VaultResult<()> {
        self.store.put(LOCKOUT_TAG, &serde_json::to_vec(state)?)?;
        Ok(())
    }

    /// Encrypt with the active profile's key
    pub fn seal(&self, plaintext: &[u8]) -> VaultResult<EncryptedBlob> {
        self.switch.read().seal(plaintext)
    }

    /// Decrypt with the active profile's key
    pub fn open(&self, blob: &EncryptedBlob) -> VaultResult<Zeroizing<Vec<u8>>> {
        self.switch.read().open(blob)
    }

    /// Rotate the active key and re-encrypt `blobs` under it.
    ///
    /// The caller must save the returned blobs; prefer
    /// [`VaultEngine::rotate_active_key_with`] when they live on disk.
    pub fn rotate_active_key(&self, blobs: &[EncryptedBlob]) -> VaultResult<Vec<EncryptedBlob>> {
        self.rotate_active_key_with(blobs, |_| Ok(()))
    }

    /// Rotate the active key, letting `persist` save the re-encrypted blobs
    /// before the new key replaces the old one.
    ///
    /// The new key is staged under its own tag until `persist` succeeds. Any
    /// failure leaves the old key in the store and in memory.
    pub fn rotate_active_key_with<F>(
        &self,
        blobs: &[EncryptedBlob],
        persist: F,
    ) -> VaultResult<Vec<EncryptedBlob>>
    where
        F: FnOnce(&[EncryptedBlob]) -> VaultResult<()>,
    {
        let mut switch = self.switch.write();
        let pending = switch.prepare_rotation(&self.keys, &self.config.rotation_context, blobs)?;
        let id = pending.profile();
        let previous = switch
            .rotation_metadata(id)
            .cloned()
            .ok_or(VaultError::NoActiveProfile)?;

        let staged = store_tag(id, KEY_NEXT);
        let installed = self
            .store
            .put(&staged, pending.key().expose())
            .and_then(|_| persist(pending.blobs()))
            .and_then(|()| self.promote(&pending, &previous));
        if let Err(e) = self.store.delete(&staged) {
            tracing::warn!(error = %e, "staged key left in store");
        }
        if let Err(err) = installed {
            tracing::warn!(error = %err, "key rotation abandoned");
            return Err(err);
        }

        let (moved, metadata) = switch.commit_rotation(pending)?;
        self.keys.rotation_committed(&metadata);
        tracing::info!(version = metadata.version, blobs = moved.len(), "active key rotated");
        Ok(moved)
    }

    /// Write the rotated metadata, then the key; restores the metadata if
    /// the key write fails
    fn promote(&self, pending: &PendingRotation, previous: &KeyRotationMetadata) -> VaultResult<()> {
        let id = pending.profile();
        self.store.put(
            &store_tag(id, ROTATION),
            &serde_json::to_vec(pending.metadata())?,
        )?;

        if let Err(err) = self.store.put(&store_tag(id, KEY), pending.key().expose()) {
            let restored = serde_json::to_vec(previous)
                .map_err(VaultError::from)
                .and_then(|bytes| self.store.put(&store_tag(id, ROTATION), &bytes));
            if let Err(e) = restored {
                tracing::warn!(error = %e, "rotation metadata not restored");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Seal assets into the decoy profile; Primary session only
    pub fn populate_decoy(&self, assets: Vec<DecoyAsset>) -> VaultResult<Vec<SealedAsset>> {
        self.switch.read().populate_decoy(assets)
    }

    /// Remove the duress profile from the store, the router and memory.
    ///
    /// The store goes first; if it fails the profile stays fully usable and
    /// the call can be retried.
    pub fn disable_profile(&self, id: ProfileId) -> VaultResult<()> {
        let mut router = self.router.write();
        let mut switch = self.switch.write();
        if !id.is_optional() {
            return Err(VaultError::NotPermitted);
        }
        let replacement = router.with_config(router.config().without_duress())?;

        // without its key the profile is never loaded again
        for kind in [KEY, PIN, ROTATION, KEY_NEXT] {
            self.store.delete(&store_tag(id, kind))?;
        }

        switch.disable(id)?;
        *router = replacement;
        tracing::info!("profile disabled");
        Ok(())
    }

    /// Copy of the active key, if the integrity advisor allows it
    pub fn export_active_key(&self) -> VaultResult<Zeroizing<Vec<u8>>> {
        if let Advice::Suspicious(reason) = self.advisor.assess() {
            tracing::warn!(%reason, "key export refused");
            return Err(VaultError::IntegrityCheckFailed(reason));
        }

        let switch = self.switch.read();
        let key = switch.active_key()?;
        Ok(Zeroizing::new(key.expose().to_vec()))
    }

    /// End the session
    pub fn lock(&self) {
        self.switch.write().lock();
    }

    pub fn failed_attempts(&self) -> u64 {
        self.router.read().failed_attempts()
    }

    pub fn active_profile(&self) -> Option<ActiveProfile> {
        self.switch.read().active()
    }

    /// Remaining attempts before lockout
    pub fn remaining_attempts(&self) -> u32 {
        let failed = self.failed_attempts();
        self.lockout.lock().remaining_attempts(failed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::events::testing::RecordingSink;
    use crate::events::SecurityEvent;
    use crate::lockout::LockoutPolicy;
    use crate::store::MemoryKeyStore;

    /// Memory store that refuses writes and deletes of one tag
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryKeyStore,
        broken: Mutex<Option<String>>,
    }

    impl FlakyStore {
        fn break_tag(&self, tag: &str) {
            *self.broken.lock() = Some(tag.to_string());
        }

        fn heal(&self) {
            *self.broken.lock() = None;
        }

        fn refuse(&self, tag: &str) -> VaultResult<()> {
            if self.broken.lock().as_deref() == Some(tag) {
                return Err(VaultError::StorageUnavailable(format!("{} refused", tag)));
            }
            Ok(())
        }
    }

    impl SecureKeyStore for FlakyStore {
        fn put(&self, tag: &str, key: &[u8]) -> VaultResult<bool> {
            self.refuse(tag)?;
            self.inner.put(tag, key)
        }

        fn get(&self, tag: &str) -> VaultResult<Option<Zeroizing<Vec<u8>>>> {
            self.inner.get(tag)
        }

        fn delete(&self, tag: &str) -> VaultResult<bool> {
            self.refuse(tag)?;
            self.inner.delete(tag)
        }
    }

    fn pin(s: &str) -> SecretString {
        SecretString::new(s.into())
    }

    fn pins(duress: bool) -> EnrollmentPins {
        EnrollmentPins {
            primary: pin("1234"),
            decoy: pin("5678"),
            duress: duress.then(|| pin("9999")),
        }
    }

    fn enrolled(duress: bool) -> (Arc<MemoryKeyStore>, VaultEngine) {
        let store = Arc::new(MemoryKeyStore::new());
        let engine = VaultEngine::builder(store.clone()).enroll(&pins(duress)).unwrap();
        (store, engine)
    }

    #[test]
    fn test_enroll_writes_tags() {
        let (store, _engine) = enrolled(true);
        assert_eq!(store.len(), 9);
        let key = store.get("alfa.vault.duress.key").unwrap().unwrap();
        assert_eq!(key.len(), 32);

        let rotation = store.get("alfa.vault.primary.rotation").unwrap().unwrap();
        let meta: KeyRotationMetadata = serde_json::from_slice(&rotation).unwrap();
        assert_eq!(meta.version, 1);
    }

    #[test]
    fn test_enroll_rejects_shared_pin_and_reenroll() {
        let store = Arc::new(MemoryKeyStore::new());
        let same = EnrollmentPins {
            primary: pin("1234"),
            decoy: pin("1234"),
            duress: None,
        };
        assert!(matches!(
            VaultEngine::builder(store.clone()).enroll(&same),
            Err(VaultError::InvalidConfig(_))
        ));
        assert!(store.is_empty());

        VaultEngine::builder(store.clone()).enroll(&pins(false)).unwrap();
        assert!(VaultEngine::builder(store).enroll(&pins(false)).is_err());
    }

    #[test]
    fn test_unlock_and_reload() {
        let (store, engine) = enrolled(false);
        assert_eq!(engine.unlock(&pin("1234")).unwrap().unwrap().id, ProfileId::Primary);
        let blob = engine.seal(b"family photo").unwrap();
        engine.lock();
        assert!(engine.open(&blob).is_err());

        let reloaded = VaultEngine::builder(store).load().unwrap();
        assert!(reloaded.unlock(&pin("0000")).unwrap().is_none());
        reloaded.unlock(&pin("1234")).unwrap();
        assert_eq!(reloaded.open(&blob).unwrap().as_slice(), b"family photo");
    }

    #[test]
    fn test_lockout() {
        let store = Arc::new(MemoryKeyStore::new());
        let config = EngineConfig::default().with_lockout(LockoutPolicy {
            max_attempts: 2,
            lockout_seconds: 300,
        });
        let engine = VaultEngine::builder(store)
            .config(config)
            .enroll(&pins(false))
            .unwrap();

        assert!(engine.unlock(&pin("0000")).unwrap().is_none());
        assert_eq!(engine.remaining_attempts(), 1);
        assert!(matches!(
            engine.unlock(&pin("0001")),
            Err(VaultError::TooManyAttempts)
        ));

        // the right PIN is refused without being evaluated
        assert!(matches!(
            engine.unlock(&pin("1234")),
            Err(VaultError::TooManyAttempts)
        ));
        assert_eq!(engine.failed_attempts(), 2);
        assert!(engine.active_profile().is_none());
    }

    #[test]
    fn test_rotate_persists_new_key() {
        let (store, engine) = enrolled(false);
        engine.unlock(&pin("1234")).unwrap();
        let blob = engine.seal(b"before").unwrap();

        let moved = engine.rotate_active_key(&[blob]).unwrap();

        let reloaded = VaultEngine::builder(store.clone()).load().unwrap();
        reloaded.unlock(&pin("1234")).unwrap();
        assert_eq!(reloaded.open(&moved[0]).unwrap().as_slice(), b"before");

        let rotation = store.get("alfa.vault.primary.rotation").unwrap().unwrap();
        let meta: KeyRotationMetadata = serde_json::from_slice(&rotation).unwrap();
        assert_eq!(meta.version, 2);
        assert!(meta.rotated.is_some());
        assert!(store.get("alfa.vault.primary.key.next").unwrap().is_none());
    }

    #[test]
    fn test_failed_rotation_keeps_old_key() {
        let store = Arc::new(FlakyStore::default());
        let sink = Arc::new(RecordingSink::default());
        let engine = VaultEngine::builder(store.clone())
            .events(sink.clone())
            .enroll(&pins(false))
            .unwrap();
        engine.unlock(&pin("1234")).unwrap();
        let blob = engine.seal(b"precious").unwrap();

        for tag in ["alfa.vault.primary.rotation", "alfa.vault.primary.key"] {
            store.break_tag(tag);
            assert!(matches!(
                engine.rotate_active_key(&[blob.clone()]),
                Err(VaultError::StorageUnavailable(_))
            ));
            assert_eq!(engine.open(&blob).unwrap().as_slice(), b"precious");
        }
        store.heal();

        // a caller that cannot save the new blobs also keeps the old key
        let refused = engine.rotate_active_key_with(&[blob.clone()], |_| {
            Err(VaultError::StorageUnavailable("disk full".into()))
        });
        assert!(refused.is_err());

        assert!(!sink
            .events()
            .iter()
            .any(|e| matches!(e, SecurityEvent::KeyRotated { .. })));
        assert!(store.get("alfa.vault.primary.key.next").unwrap().is_none());

        let reloaded = VaultEngine::builder(store.clone()).load().unwrap();
        reloaded.unlock(&pin("1234")).unwrap();
        assert_eq!(reloaded.open(&blob).unwrap().as_slice(), b"precious");

        let rotation = store.get("alfa.vault.primary.rotation").unwrap().unwrap();
        let meta: KeyRotationMetadata = serde_json::from_slice(&rotation).unwrap();
        assert_eq!(meta.version, 1);
    }

    #[test]
    fn test_rotation_event_after_commit() {
        let store = Arc::new(MemoryKeyStore::new());
        let sink = Arc::new(RecordingSink::default());
        let engine = VaultEngine::builder(store)
            .events(sink.clone())
            .enroll(&pins(false))
            .unwrap();
        engine.unlock(&pin("1234")).unwrap();
        let blob = engine.seal(b"x").unwrap();

        let mut saved = Vec::new();
        engine
            .rotate_active_key_with(&[blob], |moved| {
                saved.extend_from_slice(moved);
                Ok(())
            })
            .unwrap();
        assert_eq!(engine.open(&saved[0]).unwrap().as_slice(), b"x");
        assert_eq!(
            sink.events().last(),
            Some(&SecurityEvent::KeyRotated { version: 2 })
        );
    }

    #[test]
    fn test_failed_enroll_can_be_retried() {
        let store = Arc::new(FlakyStore::default());
        store.break_tag("alfa.vault.decoy.pin");
        assert!(matches!(
            VaultEngine::builder(store.clone()).enroll(&pins(true)),
            Err(VaultError::StorageUnavailable(_))
        ));
        assert!(store.inner.is_empty());

        store.heal();
        let engine = VaultEngine::builder(store.clone()).enroll(&pins(true)).unwrap();
        assert!(engine.unlock(&pin("5678")).unwrap().is_some());
    }

    #[test]
    fn test_lockout_survives_reload() {
        let store = Arc::new(MemoryKeyStore::new());
        let config = EngineConfig::default().with_lockout(LockoutPolicy {
            max_attempts: 2,
            lockout_seconds: 300,
        });
        let open = || {
            VaultEngine::builder(store.clone())
                .config(config.clone())
                .load()
                .unwrap()
        };
        VaultEngine::builder(store.clone())
            .config(config.clone())
            .enroll(&pins(false))
            .unwrap();

        assert!(open().unlock(&pin("0000")).unwrap().is_none());

        let second = open();
        assert_eq!(second.remaining_attempts(), 1);
        assert!(matches!(
            second.unlock(&pin("0001")),
            Err(VaultError::TooManyAttempts)
        ));

        assert!(matches!(
            open().unlock(&pin("1234")),
            Err(VaultError::TooManyAttempts)
        ));
    }

    #[test]
    fn test_concurrent_calls_do_not_deadlock() {
        let (_store, engine) = enrolled(true);
        let engine = Arc::new(engine);
        let (done, finished) = mpsc::channel();

        let spawn = |work: fn(&VaultEngine)| {
            let engine = engine.clone();
            let done = done.clone();
            thread::spawn(move || {
                work(&engine);
                let _ = done.send(());
            });
        };
        spawn(|e| {
            for i in 0..6 {
                let _ = e.unlock(&pin(if i % 2 == 0 { "0000" } else { "1234" }));
            }
        });
        spawn(|e| {
            for _ in 0..2000 {
                let _ = e.remaining_attempts();
            }
        });
        spawn(|e| {
            for _ in 0..6 {
                let _ = e.disable_profile(ProfileId::Duress);
                thread::sleep(Duration::from_millis(10));
            }
        });
        drop(done);

        for _ in 0..3 {
            assert!(finished.recv_timeout(Duration::from_secs(60)).is_ok());
        }
    }

    #[test]
    fn test_disable_duress() {
        let (store, engine) = enrolled(true);
        assert!(matches!(
            engine.disable_profile(ProfileId::Primary),
            Err(VaultError::NotPermitted)
        ));

        engine.disable_profile(ProfileId::Duress).unwrap();
        assert!(store.get("alfa.vault.duress.key").unwrap().is_none());
        assert!(store.get("alfa.vault.duress.pin").unwrap().is_none());
        assert!(engine.unlock(&pin("9999")).unwrap().is_none());

        let reloaded = VaultEngine::builder(store).load().unwrap();
        assert!(reloaded.unlock(&pin("9999")).unwrap().is_none());
        assert!(reloaded.unlock(&pin("5678")).unwrap().is_some());
    }

    #[test]
    fn test_failed_disable_keeps_profile() {
        let store = Arc::new(FlakyStore::default());
        let engine = VaultEngine::builder(store.clone()).enroll(&pins(true)).unwrap();

        store.break_tag("alfa.vault.duress.key");
        assert!(engine.disable_profile(ProfileId::Duress).is_err());
        assert!(engine.unlock(&pin("9999")).unwrap().is_some());
        let reloaded = VaultEngine::builder(store.clone()).load().unwrap();
        assert!(reloaded.unlock(&pin("9999")).unwrap().is_some());

        store.heal();
        engine.disable_profile(ProfileId::Duress).unwrap();
        assert!(engine.unlock(&pin("9999")).unwrap().is_none());
    }

    #[test]
    fn test_export_consults_advisor() {
        let (store, engine) = enrolled(false);
        assert!(matches!(
            engine.export_active_key(),
            Err(VaultError::NoActiveProfile)
        ));
        engine.unlock(&pin("5678")).unwrap();
        assert_eq!(
            engine.export_active_key().unwrap().as_slice(),
            store.get("alfa.vault.decoy.key").unwrap().unwrap().as_slice()
        );

        let suspicious: Arc<dyn IntegrityAdvisor> =
            Arc::new(|| Advice::Suspicious("debugger attached".into()));
        let guarded = VaultEngine::builder(store).advisor(suspicious).load().unwrap();
        guarded.unlock(&pin("1234")).unwrap();
        assert!(matches!(
            guarded.export_active_key(),
            Err(VaultError::IntegrityCheckFailed(_))
        ));
        // advice never blocks normal use
        assert!(guarded.seal(b"still works").is_ok());
    }

    #[test]
    fn test_events_do_not_leak_pin() {
        let store = Arc::new(MemoryKeyStore::new());
        let sink = Arc::new(RecordingSink::default());
        let engine = VaultEngine::builder(store)
            .events(sink.clone())
            .enroll(&pins(true))
            .unwrap();

        engine.unlock(&pin("9999")).unwrap();
        engine.unlock(&pin("4321")).unwrap();

        let events = sink.events();
        assert_eq!(
            &events[events.len() - 2..],
            &[
                SecurityEvent::AuthSucceeded {
                    profile: ProfileId::Duress
                },
                SecurityEvent::AuthDenied,
            ]
        );
        let json = serde_json::to_string(&events).unwrap();
        assert!(!json.contains("9999") && !json.contains("4321"));
    }
}
