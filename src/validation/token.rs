//! Validation Tokens
//!
//! A token proves an action passed validation. Format:
//!
//! ```text
//! base64url(canonical JSON claims) "." hex(HMAC-SHA256(signing_key, base64url part))
//! ```
//!
//! Claims serialize with a fixed field order, so the encoding is canonical.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::SigningKey;
use crate::error::{Result, SecurityError};
use crate::validation::result::ValidationStatus;

/// Lifetime of a validation token in seconds (15 minutes)
pub const TOKEN_TTL_SECS: i64 = 15 * 60;

/// Token lifetime as a duration
pub fn token_ttl() -> Duration {
    Duration::seconds(TOKEN_TTL_SECS)
}

/// Signed content of a validation token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationClaims {
    pub action_id: String,
    pub agent_id: String,
    pub status: ValidationStatus,
    pub security_score: f64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ValidationClaims {
    /// Claims issued at `issued_at`, expiring one TTL later
    pub fn new(
        action_id: impl Into<String>,
        agent_id: impl Into<String>,
        status: ValidationStatus,
        security_score: f64,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            action_id: action_id.into(),
            agent_id: agent_id.into(),
            status,
            security_score,
            issued_at,
            expires_at: issued_at + token_ttl(),
        }
    }
}

/// Issues and verifies validation tokens
#[derive(Debug, Clone)]
pub struct TokenSigner {
    key: SigningKey,
}

impl TokenSigner {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Sign claims into a token string
    pub fn issue(&self, claims: &ValidationClaims) -> Result<String> {
        let json = serde_json::to_vec(claims)?;
        let body = URL_SAFE_NO_PAD.encode(json);
        let signature = self.key.sign(body.as_bytes())?;
        Ok(format!("{}.{}", body, signature))
    }

    /// Check signature and expiry, returning the claims
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<ValidationClaims> {
        let (body, signature) = token
            .split_once('.')
            .ok_or_else(|| SecurityError::TokenInvalid("missing signature".to_string()))?;

        if !self.key.verify(body.as_bytes(), signature) {
            return Err(SecurityError::TokenInvalid("signature mismatch".to_string()));
        }

        let json = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|e| SecurityError::TokenInvalid(format!("bad encoding: {}", e)))?;
        let claims: ValidationClaims = serde_json::from_slice(&json)
            .map_err(|e| SecurityError::TokenInvalid(format!("bad claims: {}", e)))?;

        if now >= claims.expires_at {
            return Err(SecurityError::TokenExpired {
                action_id: claims.action_id,
            });
        }

        Ok(claims)
    }
}
