//! ALFA Vault Engine - Key Rotation Metadata
//!
//! Version bookkeeping persisted beside each profile's blobs, and the
//! schedule that decides when a rotation is due (90 days by default).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Rotation record stored next to (not inside) the encrypted blobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRotationMetadata {
    /// Starts at 1, +1 per rotation
    pub version: u32,
    /// When the key lineage was created
    pub created: DateTime<Utc>,
    /// Last rotation, `null` until the first one
    pub rotated: Option<DateTime<Utc>>,
    /// KDF rounds in force for this profile
    pub rounds: u32,
}

impl KeyRotationMetadata {
    /// Metadata for a freshly generated key
    pub fn initial(rounds: u32) -> Self {
        Self {
            version: 1,
            created: Utc::now(),
            rotated: None,
            rounds,
        }
    }

    /// Metadata after one more rotation
    pub fn next(&self) -> Self {
        Self {
            version: self.version + 1,
            created: self.created,
            rotated: Some(Utc::now()),
            rounds: self.rounds,
        }
    }

    /// Timestamp the current key came into use
    pub fn key_since(&self) -> DateTime<Utc> {
        self.rotated.unwrap_or(self.created)
    }
}

/// Longest accepted rotation interval (ten years)
pub const MAX_ROTATION_INTERVAL_DAYS: u32 = 3650;

/// Rotation policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationPolicy {
    /// Days between rotations
    pub rotation_interval_days: u32,
    /// Warning days before rotation
    pub warning_days: u32,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            rotation_interval_days: 90,
            warning_days: 7,
        }
    }
}

impl RotationPolicy {
    /// `None` if the schedule runs past the end of the calendar
    fn next_rotation(&self, meta: &KeyRotationMetadata) -> Option<DateTime<Utc>> {
        meta.key_since()
            .checked_add_signed(Duration::days(i64::from(self.rotation_interval_days)))
    }

    /// Check if rotation is needed
    pub fn is_due(&self, meta: &KeyRotationMetadata) -> bool {
        self.next_rotation(meta)
            .map_or(false, |due| Utc::now() >= due)
    }

    /// Check if rotation warning should be shown
    pub fn should_warn(&self, meta: &KeyRotationMetadata) -> bool {
        self.next_rotation(meta)
            .and_then(|due| due.checked_sub_signed(Duration::days(i64::from(self.warning_days))))
            .map_or(false, |warning_time| Utc::now() >= warning_time)
    }

    /// Days until next rotation
    pub fn days_until_due(&self, meta: &KeyRotationMetadata) -> i64 {
        self.next_rotation(meta)
            .map_or(i64::MAX, |due| (due - Utc::now()).num_days())
    }
}
