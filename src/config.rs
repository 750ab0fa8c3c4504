// Configuration File Support
//
// Configuration for the action validation pipeline, the executor and the
// audit trail. TOML format with environment variable overrides.
// The default file lives in the platform config directory, e.g.
// ~/.config/actionguard/config.toml on Linux.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::crypto::SigningKey;
use crate::logging::LoggingConfig;
use crate::validation::payload::default_required_fields;
use crate::validation::rate_limit::DEFAULT_MAX_ACTIONS_PER_MINUTE;
use crate::validation::ApprovalPolicy;

/// Text shown in place of secrets
const REDACTED: &str = "<redacted>";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Validation policy and key material
    pub security: SecurityConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Execution monitoring
    pub monitoring: MonitoringConfig,

    /// Audit trail persistence
    pub audit: AuditConfig,
}

/// Validation policy and key material
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    /// Reject agents that are not on the allow-list, even when it is empty
    pub zero_trust_mode: bool,

    /// Require MFA for CRITICAL and EMERGENCY actions
    pub mfa_required_for_critical: bool,

    /// Require Coalition-of-Experts review for EMERGENCY actions
    pub coe_required_for_emergency: bool,

    /// Actions each agent may take in a 60 second window
    pub max_action_rate_per_minute: u32,

    /// Key derivation input (used with `salt` when no signing key is set)
    pub master_key: Option<String>,

    /// Key derivation salt, at least 8 bytes
    pub salt: Option<String>,

    /// HMAC key for tokens and audit signatures (hex or raw)
    pub signing_key: Option<String>,

    /// Agents allowed to act
    pub authorized_agents: Vec<String>,

    /// Required payload fields per action type
    pub required_fields: BTreeMap<String, Vec<String>>,

    /// Offset from UTC, in minutes, used for the after-hours signal
    pub local_utc_offset_minutes: i32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            zero_trust_mode: true,
            mfa_required_for_critical: true,
            coe_required_for_emergency: true,
            max_action_rate_per_minute: DEFAULT_MAX_ACTIONS_PER_MINUTE,
            master_key: None,
            salt: None,
            signing_key: None,
            authorized_agents: Vec::new(),
            required_fields: default_required_fields(),
            local_utc_offset_minutes: 0,
        }
    }
}

impl SecurityConfig {
    /// Resolve the process signing key
    ///
    /// An explicit `signing_key` wins; otherwise the key is derived from
    /// `master_key` and `salt`; otherwise a random key is generated.
    pub fn resolve_signing_key(&self) -> Result<SigningKey> {
        if let Some(key) = &self.signing_key {
            return SigningKey::from_config_str(key).context("Invalid signing key");
        }

        match (&self.master_key, &self.salt) {
            (Some(master), Some(salt)) => {
                SigningKey::derive(master, salt).context("Failed to derive signing key")
            }
            _ => {
                tracing::warn!("No signing key configured, generating an ephemeral key");
                Ok(SigningKey::generate())
            }
        }
    }

    /// Approval switches
    pub fn approval_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy {
            mfa_required_for_critical: self.mfa_required_for_critical,
            coe_required_for_emergency: self.coe_required_for_emergency,
        }
    }

    /// Copy with secrets replaced
    pub fn redacted(&self) -> Self {
        let hide = |v: &Option<String>| v.as_ref().map(|_| REDACTED.to_string());
        Self {
            master_key: hide(&self.master_key),
            salt: hide(&self.salt),
            signing_key: hide(&self.signing_key),
            ..self.clone()
        }
    }
}

/// Execution monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Interval between monitor polls in milliseconds
    pub poll_interval_ms: u64,

    /// Hard ceiling on monitoring in seconds
    pub max_duration_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_duration_secs: 300,
        }
    }
}

impl MonitoringConfig {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.max_duration_secs)
    }
}

/// Audit trail configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuditConfig {
    /// JSON Lines file that receives every audit record
    pub log_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// fails validation. If the file does not exist, returns defaults with
    /// environment overrides applied.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;

            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "actionguard", "actionguard") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("actionguard")
                .join("config.toml")
        }
    }

    /// Apply environment variable overrides
    ///
    /// Environment variables take precedence over config file values:
    /// - ACTIONGUARD_ZERO_TRUST
    /// - ACTIONGUARD_MAX_ACTION_RATE
    /// - ACTIONGUARD_SIGNING_KEY
    /// - ACTIONGUARD_MASTER_KEY
    /// - ACTIONGUARD_SALT
    /// - ACTIONGUARD_LOG_LEVEL
    /// - ACTIONGUARD_LOG_FORMAT
    /// - ACTIONGUARD_AUDIT_LOG
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("ACTIONGUARD_ZERO_TRUST") {
            self.security.zero_trust_mode = value.parse().unwrap_or(self.security.zero_trust_mode);
        }
        if let Some(rate) = lookup("ACTIONGUARD_MAX_ACTION_RATE") {
            if let Ok(rate) = rate.parse::<u32>() {
                if rate > 0 {
                    self.security.max_action_rate_per_minute = rate;
                }
            }
        }
        if let Some(key) = lookup("ACTIONGUARD_SIGNING_KEY") {
            self.security.signing_key = Some(key);
        }
        if let Some(key) = lookup("ACTIONGUARD_MASTER_KEY") {
            self.security.master_key = Some(key);
        }
        if let Some(salt) = lookup("ACTIONGUARD_SALT") {
            self.security.salt = Some(salt);
        }

        if let Some(level) = lookup("ACTIONGUARD_LOG_LEVEL").and_then(|s| s.parse().ok()) {
            self.logging.level = level;
        }
        if let Some(format) = lookup("ACTIONGUARD_LOG_FORMAT").and_then(|s| s.parse().ok()) {
            self.logging.format = format;
        }

        if let Some(path) = lookup("ACTIONGUARD_AUDIT_LOG") {
            self.audit.log_path = Some(PathBuf::from(path));
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        let security = &self.security;

        if security.max_action_rate_per_minute == 0 {
            anyhow::bail!("max_action_rate_per_minute must be > 0");
        }
        if security.signing_key.as_deref() == Some("") {
            anyhow::bail!("signing_key must not be empty when set");
        }
        if security.master_key.is_some() != security.salt.is_some() {
            anyhow::bail!("master_key and salt must be configured together");
        }
        if let Some(salt) = &security.salt {
            if salt.len() < 8 {
                anyhow::bail!("salt must be at least 8 bytes");
            }
        }
        if security.local_utc_offset_minutes.abs() >= 24 * 60 {
            anyhow::bail!(
                "local_utc_offset_minutes must be within +/-1439, got {}",
                security.local_utc_offset_minutes
            );
        }
        if security.authorized_agents.iter().any(|a| a.trim().is_empty()) {
            anyhow::bail!("authorized_agents must not contain empty agent ids");
        }
        for (action_type, fields) in &security.required_fields {
            if fields.iter().any(|f| f.is_empty()) {
                anyhow::bail!("required_fields for '{}' contains an empty field name", action_type);
            }
        }

        if self.monitoring.poll_interval_ms == 0 {
            anyhow::bail!("Monitor poll interval must be > 0");
        }
        if self.monitoring.max_duration_secs == 0 {
            anyhow::bail!("Monitor ceiling must be > 0");
        }

        Ok(())
    }

    /// Copy with secrets replaced, for display
    pub fn redacted(&self) -> Self {
        Self {
            security: self.security.redacted(),
            ..self.clone()
        }
    }
}
