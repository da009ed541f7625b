//! ALFA Vault Engine - Attempt Lockout
//!
//! Refuses unlock attempts for a cooldown period once too many PINs in a row
//! were denied. Driven by the router's monotonic failure counter.
//!
//! The router counter starts at zero in every process, so the engine saves a
//! [`LockoutState`] to the key store and resumes from it on load. A lockout
//! therefore survives restarting the CLI.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

/// Longest accepted cooldown (one day)
pub const MAX_LOCKOUT_SECONDS: u64 = 24 * 60 * 60;

/// Lockout configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutPolicy {
    /// Consecutive denials before lockout
    pub max_attempts: u32,
    /// Cooldown period after lockout (seconds)
    pub lockout_seconds: u64,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_seconds: 300, // 5 minutes
        }
    }
}

/// Persisted lockout progress, carried across processes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutState {
    /// Denials since the last success or lockout expiry
    pub recent_failures: u64,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Lockout state over a monotonic failure counter
#[derive(Debug, Clone)]
pub struct LockoutTracker {
    policy: LockoutPolicy,
    /// Counter value at the last success or lockout expiry
    baseline: u64,
    /// Denials recorded by earlier processes
    carried: u64,
    locked_until: Option<DateTime<Utc>>,
}

impl LockoutTracker {
    /// Create new tracker starting at `failed_so_far`
    pub fn new(policy: LockoutPolicy, failed_so_far: u64) -> Self {
        Self::resume(policy, LockoutState::default(), failed_so_far)
    }

    /// Continue from a saved state
    pub fn resume(policy: LockoutPolicy, state: LockoutState, failed_so_far: u64) -> Self {
        Self {
            policy,
            baseline: failed_so_far,
            carried: state.recent_failures,
            locked_until: state.locked_until,
        }
    }

    /// Snapshot for persisting
    pub fn state(&self, failed_total: u64) -> LockoutState {
        LockoutState {
            recent_failures: self.recent(failed_total),
            locked_until: self.locked_until,
        }
    }

    fn recent(&self, failed_total: u64) -> u64 {
        self.carried
            .saturating_add(failed_total.saturating_sub(self.baseline))
    }

    fn forgive(&mut self, failed_total: u64) {
        self.baseline = failed_total;
        self.carried = 0;
        self.locked_until = None;
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Check whether an attempt may proceed.
    ///
    /// An expired lockout is cleared and its failures forgiven.
    pub fn check(&mut self, failed_total: u64) -> VaultResult<()> {
        match self.locked_until {
            Some(until) if Utc::now() < until => Err(VaultError::TooManyAttempts),
            Some(_) => {
                self.forgive(failed_total);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Record a denial; returns `TooManyAttempts` when this one trips the lock
    pub fn record_failure(&mut self, failed_total: u64) -> VaultResult<()> {
        let recent = self.recent(failed_total);
        if self.policy.max_attempts > 0 && recent >= u64::from(self.policy.max_attempts) {
            let cooldown = self.policy.lockout_seconds.min(MAX_LOCKOUT_SECONDS);
            let now = Utc::now();
            let until = now
                .checked_add_signed(Duration::seconds(cooldown as i64))
                .unwrap_or(now);
            tracing::warn!(attempts = recent, %until, "unlock locked out");
            self.locked_until = Some(until);
            return Err(VaultError::TooManyAttempts);
        }
        Ok(())
    }

    /// Record a successful unlock
    pub fn record_success(&mut self, failed_total: u64) {
        self.forgive(failed_total);
    }

    /// Remaining attempts before lockout
    pub fn remaining_attempts(&self, failed_total: u64) -> u32 {
        let recent = self.recent(failed_total);
        u64::from(self.policy.max_attempts).saturating_sub(recent) as u32
    }

    /// Get lockout remaining time (seconds)
    pub fn lockout_remaining(&self) -> Option<i64> {
        self.locked_until
            .map(|until| (until - Utc::now()).num_seconds().max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lockout_after_max_attempts() {
        let policy = LockoutPolicy {
            max_attempts: 3,
            ..Default::default()
        };
        let mut tracker = LockoutTracker::new(policy, 10);
        assert_eq!(tracker.remaining_attempts(10), 3);

        assert!(tracker.record_failure(11).is_ok());
        assert!(tracker.record_failure(12).is_ok());
        assert!(matches!(tracker.record_failure(13), Err(VaultError::TooManyAttempts)));

        assert!(matches!(tracker.check(13), Err(VaultError::TooManyAttempts)));
        assert!(tracker.lockout_remaining().unwrap() > 0);
    }

    #[test]
    fn test_success_resets_window() {
        let mut tracker = LockoutTracker::new(LockoutPolicy::default(), 0);
        for total in 1..=4 {
            tracker.record_failure(total).unwrap();
        }
        tracker.record_success(4);
        assert_eq!(tracker.remaining_attempts(4), 5);
        assert!(tracker.record_failure(5).is_ok());
    }

    #[test]
    fn test_expired_lockout_clears() {
        let policy = LockoutPolicy {
            max_attempts: 1,
            lockout_seconds: 0,
        };
        let mut tracker = LockoutTracker::new(policy, 0);
        assert!(tracker.record_failure(1).is_err());

        assert!(tracker.check(1).is_ok());
        assert!(tracker.lockout_remaining().is_none());
        assert_eq!(tracker.remaining_attempts(1), 1);
    }

    #[test]
    fn test_state_survives_restart() {
        let policy = LockoutPolicy {
            max_attempts: 3,
            ..Default::default()
        };
        let mut first = LockoutTracker::new(policy.clone(), 0);
        first.record_failure(1).unwrap();
        first.record_failure(2).unwrap();
        let saved = first.state(2);
        assert_eq!(saved.recent_failures, 2);

        // a new process restarts the router counter at zero
        let mut second = LockoutTracker::resume(policy.clone(), saved, 0);
        assert_eq!(second.remaining_attempts(0), 1);
        assert!(second.record_failure(1).is_err());

        let mut third = LockoutTracker::resume(policy, second.state(1), 0);
        assert!(matches!(third.check(0), Err(VaultError::TooManyAttempts)));
    }

    #[test]
    fn test_oversized_cooldown_is_capped() {
        let policy = LockoutPolicy {
            max_attempts: 1,
            lockout_seconds: u64::MAX,
        };
        let mut tracker = LockoutTracker::new(policy, 0);
        assert!(tracker.record_failure(1).is_err());
        let remaining = tracker.lockout_remaining().unwrap();
        assert!(remaining > 0 && remaining <= MAX_LOCKOUT_SECONDS as i64);
    }
}
