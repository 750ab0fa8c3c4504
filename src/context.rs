//! Action Security Context
//!
//! The input to the validation pipeline. A context is built once per action
//! request and is never changed afterwards, except that the pipeline appends
//! threat indicators and checkpoint names as it runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Payload of an action: string keys to scalar values
pub type Payload = BTreeMap<String, Value>;

/// Caller-declared severity of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Routine, low impact
    Low,
    /// Moderate impact
    Medium,
    /// Significant impact
    High,
    /// Severe impact, needs MFA when configured
    Critical,
    /// Break-glass action, needs MFA and CoE review when configured
    Emergency,
}

impl Severity {
    /// CRITICAL or EMERGENCY
    pub fn is_critical_or_above(self) -> bool {
        matches!(self, Severity::Critical | Severity::Emergency)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::Emergency => write!(f, "EMERGENCY"),
        }
    }
}

/// Everything the pipeline knows about one action request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSecurityContext {
    action_id: String,
    agent_id: String,
    action_type: String,
    #[serde(default)]
    payload: Payload,
    severity: Severity,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    source_ip: Option<String>,
    environment: String,

    /// Signals raised by threat assessment, in the order they were raised
    #[serde(default)]
    threat_indicators: Vec<String>,

    /// Pipeline stages this context has passed through
    #[serde(default)]
    checkpoints: Vec<String>,
}

impl ActionSecurityContext {
    /// Create a context with a fresh action id
    pub fn new(
        agent_id: impl Into<String>,
        action_type: impl Into<String>,
        severity: Severity,
        environment: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            action_id: format!("action-{}", uuid::Uuid::new_v4()),
            agent_id: agent_id.into(),
            action_type: action_type.into(),
            payload: Payload::new(),
            severity,
            timestamp,
            source_ip: None,
            environment: environment.into(),
            threat_indicators: Vec::new(),
            checkpoints: Vec::new(),
        }
    }

    /// Override the generated action id
    pub fn with_action_id(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = action_id.into();
        self
    }

    /// Set the payload
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Add one payload field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Set the originating network address
    pub fn with_source_ip(mut self, source_ip: impl Into<String>) -> Self {
        self.source_ip = Some(source_ip.into());
        self
    }

    pub fn action_id(&self) -> &str {
        &self.action_id
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn action_type(&self) -> &str {
        &self.action_type
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn source_ip(&self) -> Option<&str> {
        self.source_ip.as_deref()
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Whether the action targets production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn threat_indicators(&self) -> &[String] {
        &self.threat_indicators
    }

    pub fn checkpoints(&self) -> &[String] {
        &self.checkpoints
    }

    pub(crate) fn push_indicator(&mut self, indicator: impl Into<String>) {
        self.threat_indicators.push(indicator.into());
    }

    pub(crate) fn push_checkpoint(&mut self, checkpoint: impl Into<String>) {
        self.checkpoints.push(checkpoint.into());
    }
}
