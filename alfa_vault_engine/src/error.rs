//! ALFA Vault Engine - Error Types

use thiserror::Error;

/// Result type for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Vault error types
///
/// A rejected PIN is not an error: it is `AuthOutcome::Denied`.
#[derive(Error, Debug)]
pub enum VaultError {
    // ═══════════════════════════════════════════════════════════════
    // CRYPTO ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Insufficient entropy in generated key material after {attempts} attempts")]
    InsufficientEntropy { attempts: u32 },

    #[error("Random source failed: {0}")]
    RandomSourceFailed(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Authentication failed - blob corrupted, tampered or wrong key")]
    AuthenticationFailed,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Invalid blob: {0}")]
    InvalidBlob(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    // ═══════════════════════════════════════════════════════════════
    // SESSION ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("No active profile - unlock first")]
    NoActiveProfile,

    #[error("Operation not permitted")]
    NotPermitted,

    #[error("Too many failed attempts - try again later")]
    TooManyAttempts,

    #[error("Integrity check failed: {0}")]
    IntegrityCheckFailed(String),

    // ═══════════════════════════════════════════════════════════════
    // STORAGE / CONFIG ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Secure storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl VaultError {
    /// Check if this is a security-critical error
    pub fn is_security_critical(&self) -> bool {
        matches!(
            self,
            VaultError::InsufficientEntropy { .. }
                | VaultError::RandomSourceFailed(_)
                | VaultError::AuthenticationFailed
                | VaultError::TooManyAttempts
                | VaultError::IntegrityCheckFailed(_)
        )
    }

    /// Check if the session should lock after this error
    pub fn requires_lockdown(&self) -> bool {
        matches!(
            self,
            VaultError::TooManyAttempts | VaultError::IntegrityCheckFailed(_)
        )
    }

    /// Check if the caller may retry (with corrected inputs where relevant)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VaultError::KeyDerivationFailed(_) | VaultError::NoActiveProfile
        )
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(VaultError::AuthenticationFailed.is_security_critical());
        assert!(VaultError::TooManyAttempts.requires_lockdown());
        assert!(!VaultError::AuthenticationFailed.is_retryable());
        assert!(VaultError::KeyDerivationFailed("empty".into()).is_retryable());
        assert!(!VaultError::StorageUnavailable("offline".into()).is_retryable());
    }

    #[test]
    fn test_messages_are_generic() {
        assert_eq!(VaultError::NotPermitted.to_string(), "Operation not permitted");
        assert_eq!(
            VaultError::InsufficientEntropy { attempts: 3 }.to_string(),
            "Insufficient entropy in generated key material after 3 attempts"
        );
    }
}
