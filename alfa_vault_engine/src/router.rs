//! ALFA Vault Engine - Authentication Router
//!
//! Maps one submitted PIN to exactly one [`AuthOutcome`]. Every slot is
//! derived and compared on every call, in the same order, with no early exit,
//! so the time taken does not depend on which profile matched.
//!
//! ```text
//! Idle ──evaluate()──▶ Evaluating ──▶ PrimaryUnlock | DecoyUnlock
//!  ▲                                   | DuressUnlock  | Denied
//!  └───────────────────────────────────────────────────────┘
//! ```

use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::crypto::compare::ct_eq_mask;
use crate::crypto::kdf::{PasswordKdf, KDF_OUTPUT_LEN};
use crate::crypto::keys::{fill_random, SALT_LEN};
use crate::error::VaultResult;
use crate::events::{SecurityEvent, SecurityEventSink};
use crate::profile::{ProfileConfig, ProfileId};

/// Result of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    PrimaryUnlock,
    DecoyUnlock,
    DuressUnlock,
    Denied,
}

impl AuthOutcome {
    /// Profile selected by this outcome
    pub fn profile(&self) -> Option<ProfileId> {
        match self {
            Self::PrimaryUnlock => Some(ProfileId::Primary),
            Self::DecoyUnlock => Some(ProfileId::Decoy),
            Self::DuressUnlock => Some(ProfileId::Duress),
            Self::Denied => None,
        }
    }
}

/// Single-use proof that [`AuthRouter::evaluate`] ran.
///
/// Not `Clone`: the switch controller consumes it, so changing profile always
/// costs a fresh evaluation.
#[derive(Debug)]
#[must_use]
pub struct Evaluation {
    outcome: AuthOutcome,
}

impl Evaluation {
    pub fn outcome(&self) -> AuthOutcome {
        self.outcome
    }

    pub fn is_denied(&self) -> bool {
        matches!(self.outcome, AuthOutcome::Denied)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(outcome: AuthOutcome) -> Self {
        Self { outcome }
    }
}

/// One comparison slot. Unconfigured profiles get a random never-live slot
/// so the number of derivations is always three.
struct Slot {
    hash: Zeroizing<Vec<u8>>,
    salt: Vec<u8>,
    live: u8,
}

impl Slot {
    fn filler() -> VaultResult<Self> {
        let mut hash = Zeroizing::new(vec![0u8; KDF_OUTPUT_LEN]);
        let mut salt = vec![0u8; SALT_LEN];
        fill_random(&mut hash)?;
        fill_random(&mut salt)?;
        Ok(Self { hash, salt, live: 0 })
    }
}

/// Constant-time PIN router
pub struct AuthRouter {
    kdf: PasswordKdf,
    config: ProfileConfig,
    slots: [Slot; 3],
    failed_attempts: AtomicU64,
    events: Arc<dyn SecurityEventSink>,
}

impl AuthRouter {
    pub fn new(config: ProfileConfig, events: Arc<dyn SecurityEventSink>) -> VaultResult<Self> {
        Self::with_kdf(PasswordKdf::new(), config, events)
    }

    pub fn with_kdf(
        kdf: PasswordKdf,
        config: ProfileConfig,
        events: Arc<dyn SecurityEventSink>,
    ) -> VaultResult<Self> {
        let slot = |id: ProfileId| -> VaultResult<Slot> {
            match config.get(id) {
                Some(pin) => Ok(Slot {
                    hash: Zeroizing::new(pin.hash.clone()),
                    salt: pin.salt.clone(),
                    live: 1,
                }),
                None => Slot::filler(),
            }
        };
        let slots = [
            slot(ProfileId::Primary)?,
            slot(ProfileId::Decoy)?,
            slot(ProfileId::Duress)?,
        ];

        Ok(Self {
            kdf,
            config,
            slots,
            failed_attempts: AtomicU64::new(0),
            events,
        })
    }

    /// Router for a replacement configuration; the failure count carries over
    pub fn with_config(&self, config: ProfileConfig) -> VaultResult<Self> {
        let next = Self::with_kdf(self.kdf, config, self.events.clone())?;
        next.failed_attempts
            .store(self.failed_attempts(), Ordering::SeqCst);
        Ok(next)
    }

    pub fn config(&self) -> &ProfileConfig {
        &self.config
    }

    /// Total denied evaluations; never decreases
    pub fn failed_attempts(&self) -> u64 {
        self.failed_attempts.load(Ordering::SeqCst)
    }

    /// Evaluate `pin` against every slot.
    ///
    /// Runs to completion; there is no cancellation point inside.
    pub fn evaluate(&self, pin: &SecretString) -> Evaluation {
        let secret = pin.expose_secret().as_bytes();
        let rounds = self.config.iterations();

        // bit 0 primary, bit 1 decoy, bit 2 duress
        let mut selector = 0u8;
        for (bit, slot) in self.slots.iter().enumerate() {
            let derived = self.kdf.stretch(secret, &slot.salt, rounds);
            let hit = ct_eq_mask(&*derived, &slot.hash) & slot.live;
            selector |= hit << bit;
        }

        // more than one hit is impossible with distinct enrolled PINs; fail closed
        let outcome = match black_box(selector) {
            0b001 => AuthOutcome::PrimaryUnlock,
            0b010 => AuthOutcome::DecoyUnlock,
            0b100 => AuthOutcome::DuressUnlock,
            _ => AuthOutcome::Denied,
        };

        match outcome.profile() {
            Some(profile) => {
                self.events.notify(&SecurityEvent::AuthSucceeded { profile });
            }
            None => {
                self.failed_attempts.fetch_add(1, Ordering::SeqCst);
                self.events.notify(&SecurityEvent::AuthDenied);
            }
        }

        Evaluation { outcome }
    }
}
