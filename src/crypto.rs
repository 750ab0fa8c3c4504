//! Signing Keys and Hashing
//!
//! HMAC-SHA256 signing for validation tokens and audit records, SHA-256 hex
//! digests for the audit chain, and Argon2id derivation of keys from the
//! configured `master_key`/`salt` pair.

use argon2::{Algorithm, Argon2, Params, Version};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{Result, SecurityError};

type HmacSha256 = Hmac<Sha256>;

/// Length in bytes of generated and derived keys
pub const KEY_LEN: usize = 32;

/// HMAC key used for validation tokens and audit signatures
///
/// The key is held for the lifetime of the process. `Debug` never prints it.
#[derive(Clone)]
pub struct SigningKey {
    bytes: Vec<u8>,
}

impl SigningKey {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(SecurityError::Config("signing key must not be empty".to_string()));
        }
        Ok(Self { bytes })
    }

    /// Parse a configured key: hex when it decodes as hex, raw UTF-8 bytes otherwise
    pub fn from_config_str(value: &str) -> Result<Self> {
        match hex::decode(value) {
            Ok(bytes) if !bytes.is_empty() => Self::from_bytes(bytes),
            _ => Self::from_bytes(value.as_bytes().to_vec()),
        }
    }

    /// Generate a random key
    pub fn generate() -> Self {
        let bytes: [u8; KEY_LEN] = rand::random();
        Self {
            bytes: bytes.to_vec(),
        }
    }

    /// Derive a key from a master secret and salt using Argon2id
    pub fn derive(master_key: &str, salt: &str) -> Result<Self> {
        if salt.len() < 8 {
            return Err(SecurityError::KeyDerivation(
                "salt must be at least 8 bytes".to_string(),
            ));
        }

        let params = Params::new(8 * 1024, 2, 1, Some(KEY_LEN))
            .map_err(|e| SecurityError::KeyDerivation(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = [0u8; KEY_LEN];
        argon2
            .hash_password_into(master_key.as_bytes(), salt.as_bytes(), &mut key)
            .map_err(|e| SecurityError::KeyDerivation(e.to_string()))?;

        Ok(Self { bytes: key.to_vec() })
    }

    /// HMAC-SHA256 of `data`, hex encoded
    pub fn sign(&self, data: &[u8]) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.bytes)
            .map_err(|e| SecurityError::Signing(e.to_string()))?;
        mac.update(data);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Constant-time check of a hex signature over `data`
    pub fn verify(&self, data: &[u8], signature_hex: &str) -> bool {
        let Ok(expected) = hex::decode(signature_hex) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.bytes) else {
            return false;
        };
        mac.update(data);
        mac.verify_slice(&expected).is_ok()
    }

    /// Key fingerprint (first 8 bytes of SHA-256), safe to log
    pub fn fingerprint(&self) -> String {
        sha256_hex(&self.bytes)[..16].to_string()
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// SHA-256 of `data`, lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
