//! Validation Results
//!
//! `SecurityValidationResult` is produced fresh for every validation call.
//! A signed token and its expiry are present exactly when the status is
//! APPROVED, REQUIRES_MFA or REQUIRES_COE.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::validation::approvals::ApprovalRequirement;
use crate::validation::identity::IdentityCheckResult;
use crate::validation::payload::PayloadCheckResult;
use crate::validation::rate_limit::RateLimitResult;
use crate::validation::threat::{ThreatAssessmentResult, ThreatLevel};

/// Name of the failed check recorded when validation fails closed
pub const SYSTEM_ERROR_CHECK: &str = "validation_system_error";

/// Failed-check name for an unverified agent
pub const IDENTITY_CHECK_FAILED: &str = "identity_verification_failed";

/// Failed-check name for a rate-limited agent
pub const RATE_LIMIT_CHECK_FAILED: &str = "rate_limit_exceeded";

/// State of an action in the validation state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Pending,
    Approved,
    Rejected,
    Blocked,
    RequiresMfa,
    RequiresCoe,
}

impl ValidationStatus {
    /// Statuses that carry a signed validation token
    pub fn issues_token(self) -> bool {
        matches!(
            self,
            ValidationStatus::Approved | ValidationStatus::RequiresMfa | ValidationStatus::RequiresCoe
        )
    }

    /// Waiting for an external approval
    pub fn is_pending_approval(self) -> bool {
        matches!(self, ValidationStatus::RequiresMfa | ValidationStatus::RequiresCoe)
    }

    /// Wire name
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationStatus::Pending => "PENDING",
            ValidationStatus::Approved => "APPROVED",
            ValidationStatus::Rejected => "REJECTED",
            ValidationStatus::Blocked => "BLOCKED",
            ValidationStatus::RequiresMfa => "REQUIRES_MFA",
            ValidationStatus::RequiresCoe => "REQUIRES_COE",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-check details, one named slot per sub-check
///
/// Checks that did not run (early exit) are absent from the JSON form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityCheckResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<PayloadCheckResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threat_assessment: Option<ThreatAssessmentResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_error: Option<String>,
}

/// Decision for one action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityValidationResult {
    pub action_id: String,
    pub validation_status: ValidationStatus,
    pub security_score: f64,
    pub threat_level: ThreatLevel,
    pub validation_details: ValidationDetails,
    pub failed_checks: Vec<String>,
    pub required_approvals: Vec<ApprovalRequirement>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub validation_token: Option<String>,
}

impl SecurityValidationResult {
    /// A result with no token, used for terminal states
    pub(crate) fn unsigned(
        action_id: impl Into<String>,
        status: ValidationStatus,
        security_score: f64,
        threat_level: ThreatLevel,
    ) -> Self {
        Self {
            action_id: action_id.into(),
            validation_status: status,
            security_score,
            threat_level,
            validation_details: ValidationDetails::default(),
            failed_checks: Vec::new(),
            required_approvals: Vec::new(),
            issued_at: None,
            expires_at: None,
            validation_token: None,
        }
    }

    /// Fail-closed result for an internal error
    pub fn system_error(action_id: impl Into<String>, error: impl fmt::Display) -> Self {
        let mut result = Self::unsigned(action_id, ValidationStatus::Rejected, 0.0, ThreatLevel::Critical);
        result.failed_checks.push(SYSTEM_ERROR_CHECK.to_string());
        result.validation_details.system_error = Some(error.to_string());
        result
    }

    /// Whether the action may run now
    pub fn is_approved(&self) -> bool {
        self.validation_status == ValidationStatus::Approved
    }

    /// Required approvals as wire names
    pub fn required_approval_names(&self) -> Vec<String> {
        self.required_approvals
            .iter()
            .map(|r| r.as_str().to_string())
            .collect()
    }

    /// Whether the token/expiry fields agree with the status
    pub fn token_invariant_holds(&self) -> bool {
        let has_token = self.validation_token.is_some();
        has_token == self.validation_status.issues_token()
            && has_token == self.expires_at.is_some()
            && has_token == self.issued_at.is_some()
    }

    /// Whether the approval window has closed at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| now >= expires)
    }
}
