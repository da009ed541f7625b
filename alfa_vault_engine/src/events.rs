//! Security event notifications
//!
//! Events carry no secrets: no PIN, no key bytes, no plaintext.

use serde::Serialize;

use crate::profile::ProfileId;

/// Event handed to the external logging/redaction collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SecurityEvent {
    KeyRotated { version: u32 },
    AuthDenied,
    AuthSucceeded { profile: ProfileId },
    EntropyValidationFailed,
}

/// Receiver of security events
pub trait SecurityEventSink: Send + Sync {
    fn notify(&self, event: &SecurityEvent);
}

/// Default sink: writes events through `tracing`.
///
/// Successful unlocks are logged identically for every profile so a log reader
/// cannot tell a duress or decoy session from a primary one.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl SecurityEventSink for TracingEventSink {
    fn notify(&self, event: &SecurityEvent) {
        match event {
            SecurityEvent::KeyRotated { version } => {
                tracing::info!(version, "key rotated");
            }
            SecurityEvent::AuthDenied => tracing::info!("unlock attempt denied"),
            SecurityEvent::AuthSucceeded { .. } => tracing::info!("vault unlocked"),
            SecurityEvent::EntropyValidationFailed => {
                tracing::warn!("generated key material failed entropy validation");
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_string(&SecurityEvent::KeyRotated { version: 2 }).unwrap();
        assert_eq!(json, r#"{"event":"key_rotated","version":2}"#);

        let json = serde_json::to_string(&SecurityEvent::AuthSucceeded {
            profile: ProfileId::Decoy,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"auth_succeeded","profile":"decoy"}"#);
    }
}
