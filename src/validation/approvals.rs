//! Approval Requirements
//!
//! Decides which extra approvals an action needs before it may run. The
//! resolver only names requirements; collecting MFA or a Coalition-of-Experts
//! review happens outside this crate.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::context::{ActionSecurityContext, Severity};
use crate::validation::threat::ThreatLevel;

/// Score below which enhanced verification is required
pub const ENHANCED_VERIFICATION_THRESHOLD: f64 = 0.7;

/// An extra approval an action must collect
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalRequirement {
    MultiFactorAuthentication,
    CoalitionOfExperts,
    SecurityOfficerReview,
    EnhancedVerification,
}

impl ApprovalRequirement {
    /// Wire name
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalRequirement::MultiFactorAuthentication => "multi_factor_authentication",
            ApprovalRequirement::CoalitionOfExperts => "coalition_of_experts",
            ApprovalRequirement::SecurityOfficerReview => "security_officer_review",
            ApprovalRequirement::EnhancedVerification => "enhanced_verification",
        }
    }
}

impl fmt::Display for ApprovalRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Approval policy switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalPolicy {
    pub mfa_required_for_critical: bool,
    pub coe_required_for_emergency: bool,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            mfa_required_for_critical: true,
            coe_required_for_emergency: true,
        }
    }
}

/// Resolves approval requirements from severity, threat level and score
#[derive(Debug, Clone, Copy, Default)]
pub struct ApprovalResolver {
    policy: ApprovalPolicy,
}

impl ApprovalResolver {
    pub fn new(policy: ApprovalPolicy) -> Self {
        Self { policy }
    }

    /// Ordered, de-duplicated list of required approvals
    pub fn resolve(
        &self,
        ctx: &ActionSecurityContext,
        threat_level: ThreatLevel,
        security_score: f64,
    ) -> Vec<ApprovalRequirement> {
        let mut required = Vec::new();

        if self.policy.mfa_required_for_critical && ctx.severity().is_critical_or_above() {
            required.push(ApprovalRequirement::MultiFactorAuthentication);
        }
        if self.policy.coe_required_for_emergency && ctx.severity() == Severity::Emergency {
            required.push(ApprovalRequirement::CoalitionOfExperts);
        }
        if threat_level.is_elevated() {
            required.push(ApprovalRequirement::SecurityOfficerReview);
        }
        if security_score < ENHANCED_VERIFICATION_THRESHOLD {
            required.push(ApprovalRequirement::EnhancedVerification);
        }

        required
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ctx(severity: Severity) -> ActionSecurityContext {
        let ts = Utc.with_ymd_and_hms(2026, 2, 2, 12, 0, 0).unwrap();
        ActionSecurityContext::new("agent-1", "deploy", severity, "dev", ts)
    }

    #[test]
    fn test_low_severity_needs_nothing() {
        let resolver = ApprovalResolver::default();
        assert!(resolver
            .resolve(&ctx(Severity::Low), ThreatLevel::Minimal, 0.95)
            .is_empty());
    }

    #[test]
    fn test_critical_needs_mfa() {
        let resolver = ApprovalResolver::default();
        let required = resolver.resolve(&ctx(Severity::Critical), ThreatLevel::Low, 0.83);
        assert_eq!(required, vec![ApprovalRequirement::MultiFactorAuthentication]);
    }

    #[test]
    fn test_emergency_needs_mfa_and_coe() {
        let resolver = ApprovalResolver::default();
        let required = resolver.resolve(&ctx(Severity::Emergency), ThreatLevel::Moderate, 0.8);
        assert_eq!(
            required,
            vec![
                ApprovalRequirement::MultiFactorAuthentication,
                ApprovalRequirement::CoalitionOfExperts
            ]
        );
    }

    #[test]
    fn test_policy_switches_disable_requirements() {
        let resolver = ApprovalResolver::new(ApprovalPolicy {
            mfa_required_for_critical: false,
            coe_required_for_emergency: false,
        });
        assert!(resolver
            .resolve(&ctx(Severity::Emergency), ThreatLevel::Moderate, 0.8)
            .is_empty());
    }

    #[test]
    fn test_elevated_threat_and_low_score() {
        let resolver = ApprovalResolver::default();
        let required = resolver.resolve(&ctx(Severity::Medium), ThreatLevel::High, 0.65);
        assert_eq!(
            required,
            vec![
                ApprovalRequirement::SecurityOfficerReview,
                ApprovalRequirement::EnhancedVerification
            ]
        );
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_string(&ApprovalRequirement::CoalitionOfExperts).unwrap();
        assert_eq!(json, "\"coalition_of_experts\"");
        assert_eq!(
            ApprovalRequirement::MultiFactorAuthentication.to_string(),
            "multi_factor_authentication"
        );
    }
}
