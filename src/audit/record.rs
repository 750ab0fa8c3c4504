//! Audit Records
//!
//! One record per executed action. Records are immutable once appended; the
//! hash covers the identifying fields plus the previous record's hash, and
//! the signature is an HMAC over that hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::context::ActionSecurityContext;
use crate::crypto::sha256_hex;
use crate::validation::SecurityValidationResult;

/// How an executed action ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Action returned a result
    Completed,
    /// Action returned an error or panicked
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry in the audit chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique identifier for this record (UUID)
    pub audit_id: String,
    pub action_id: String,
    pub agent_id: String,
    pub action_type: String,
    /// `completed` or `failed`
    pub execution_status: String,
    /// When the record was created (UTC)
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub context: ActionSecurityContext,
    pub validation_result: SecurityValidationResult,
    pub execution_result: Value,
    pub record_hash: String,
    /// `None` for the first record in a chain
    pub previous_hash: Option<String>,
    pub signature: String,
}

impl AuditRecord {
    /// Create an unsealed record; the chain fills in hash, link and signature
    pub fn new(
        context: ActionSecurityContext,
        validation_result: SecurityValidationResult,
        execution_status: ExecutionStatus,
        duration_ms: u64,
        execution_result: Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            audit_id: uuid::Uuid::new_v4().to_string(),
            action_id: context.action_id().to_string(),
            agent_id: context.agent_id().to_string(),
            action_type: context.action_type().to_string(),
            execution_status: execution_status.as_str().to_string(),
            timestamp,
            duration_ms,
            context,
            validation_result,
            execution_result,
            record_hash: String::new(),
            previous_hash: None,
            signature: String::new(),
        }
    }

    /// SHA-256 over audit id, action id, agent id, status, duration and previous hash
    pub fn compute_hash(&self) -> String {
        let material = format!(
            "{}{}{}{}{}{}",
            self.audit_id,
            self.action_id,
            self.agent_id,
            self.execution_status,
            self.duration_ms,
            self.previous_hash.as_deref().unwrap_or("")
        );
        sha256_hex(material.as_bytes())
    }

    /// Whether the action completed
    pub fn succeeded(&self) -> bool {
        self.execution_status == ExecutionStatus::Completed.as_str()
    }
}
