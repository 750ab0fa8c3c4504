//! Error Types
//!
//! Errors raised inside the validation pipeline and the audit chain. Validation
//! errors never reach callers of `ValidationOrchestrator::validate`: they are
//! converted into a fail-closed REJECTED result. Audit append failures are the
//! one error that does propagate.

/// Error types for security validation and auditing
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    /// Identity store lookup failed
    #[error("Identity store error: {0}")]
    IdentityStore(String),

    /// HMAC signing failed
    #[error("Signing error: {0}")]
    Signing(String),

    /// Validation token is malformed or its signature does not match
    #[error("Invalid validation token: {0}")]
    TokenInvalid(String),

    /// Validation token is past its expiry
    #[error("Validation token for action {action_id} has expired")]
    TokenExpired { action_id: String },

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Audit record could not be appended (fatal for the embedding system)
    #[error("Audit append failed: {0}")]
    AuditAppend(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key derivation failed
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, SecurityError>;
