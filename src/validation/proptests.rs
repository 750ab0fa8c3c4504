//! Property-Based Tests for the Validation Pipeline
//!
//! # Test Strategies
//!
//! - **Determinism**: threat assessment and scoring return identical results
//!   for identical inputs
//! - **Bounds**: scores stay in [0, 1] with at most three decimals
//! - **Rate limiting**: exactly `limit` actions are admitted per window
//! - **Payload rules**: injection patterns are caught in any casing and position,
//!   at any nesting depth
//!
//! # Running the Tests
//!
//! ```bash
//! cargo test --lib validation::proptests
//! ```

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::Value;

use crate::audit::record::tests::sample_record;
use crate::context::{ActionSecurityContext, Payload, Severity};
use crate::validation::approvals::ApprovalRequirement;
use crate::validation::orchestrator::decide_status;
use crate::validation::payload::{PayloadValidator, INJECTION_PATTERNS};
use crate::validation::rate_limit::RateLimiter;
use crate::validation::result::ValidationStatus;
use crate::validation::scorer::{ScoreInputs, SecurityScorer};
use crate::validation::threat::{ThreatAssessor, ThreatLevel};

fn arb_severity() -> impl Strategy<Value = Severity> {
    prop_oneof![
        Just(Severity::Low),
        Just(Severity::Medium),
        Just(Severity::High),
        Just(Severity::Critical),
        Just(Severity::Emergency),
    ]
}

fn arb_threat_level() -> impl Strategy<Value = ThreatLevel> {
    prop_oneof![
        Just(ThreatLevel::Minimal),
        Just(ThreatLevel::Low),
        Just(ThreatLevel::Moderate),
        Just(ThreatLevel::High),
        Just(ThreatLevel::Critical),
    ]
}

fn arb_approvals() -> impl Strategy<Value = Vec<ApprovalRequirement>> {
    prop::sample::subsequence(
        vec![
            ApprovalRequirement::MultiFactorAuthentication,
            ApprovalRequirement::CoalitionOfExperts,
            ApprovalRequirement::SecurityOfficerReview,
            ApprovalRequirement::EnhancedVerification,
        ],
        0..=4,
    )
}

fn arb_context() -> impl Strategy<Value = ActionSecurityContext> {
    (
        0u32..24,
        0u32..60,
        arb_severity(),
        prop_oneof![Just("production"), Just("staging"), Just("development")],
    )
        .prop_map(|(hour, minute, severity, env)| {
            let ts = Utc.with_ymd_and_hms(2026, 5, 20, hour, minute, 0).unwrap();
            ActionSecurityContext::new("agent-1", "deploy", severity, env, ts)
        })
}

// ============================================================================
// Property 1: Determinism
// ============================================================================

proptest! {
    /// Same context and audit history give the same assessment
    #[test]
    fn prop_threat_assessment_deterministic(
        ctx in arb_context(),
        own_actions in 0usize..50,
        offset in -720i32..720
    ) {
        let history: Vec<_> = (0..50)
            .map(|i| {
                let agent = if i < own_actions { "agent-1" } else { "agent-2" };
                sample_record(&format!("act-{i}"), agent)
            })
            .collect();
        let assessor = ThreatAssessor::with_offset_minutes(offset);

        let first = assessor.assess(&ctx, &history);
        let second = assessor.assess(&ctx, &history);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.threat_score.to_bits(), second.threat_score.to_bits());
        prop_assert!((0.0..=1.0).contains(&first.threat_score));
        prop_assert_eq!(first.recent_agent_actions, own_actions);
    }

    /// Indicators account for the whole threat score
    #[test]
    fn prop_threat_score_matches_indicators(ctx in arb_context()) {
        let result = ThreatAssessor::default().assess(&ctx, &[]);
        let tenths: u32 = result
            .indicators
            .iter()
            .map(|indicator| match indicator.as_str() {
                "after_hours_activity" => 2,
                "high_activity_agent" => 3,
                "critical_severity" => 4,
                "production_environment" => 1,
                _ => 100,
            })
            .sum();
        prop_assert_eq!(result.threat_score, f64::from(tenths) / 10.0);
    }

    /// Scores are bounded, rounded and reproducible
    #[test]
    fn prop_score_bounded_and_deterministic(
        identity_verified in any::<bool>(),
        under_rate_limit in any::<bool>(),
        payload_valid in any::<bool>(),
        threat_tenths in 0u32..=10,
        production in any::<bool>()
    ) {
        let inputs = ScoreInputs {
            identity_verified,
            under_rate_limit,
            payload_valid,
            threat_score: f64::from(threat_tenths) / 10.0,
            production,
        };
        let score = SecurityScorer.score(inputs);

        prop_assert!((0.0..=1.0).contains(&score));
        prop_assert_eq!(score.to_bits(), SecurityScorer.score(inputs).to_bits());
        prop_assert!(((score * 1000.0).round() - score * 1000.0).abs() < 1e-6);
    }
}

// ============================================================================
// Property 2: Rate Limiter Ceiling
// ============================================================================

proptest! {
    /// Within one window exactly `limit` actions pass; a fresh window admits again
    #[test]
    fn prop_rate_limit_ceiling(limit in 1u32..40, extra in 1usize..10, step_ms in 0i64..1000) {
        let limiter = RateLimiter::new(limit);
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        let mut admitted = 0;
        let total = limit as usize + extra;
        for i in 0..total {
            // spread the burst over less than one window
            let now = start + Duration::milliseconds(step_ms * i as i64 / total as i64);
            if limiter.allow("agent-1", now).allowed {
                admitted += 1;
            }
        }
        prop_assert_eq!(admitted, limit as usize);

        let later = start + Duration::seconds(61);
        prop_assert!(limiter.allow("agent-1", later).allowed);
    }
}

// ============================================================================
// Property 3: Payload and Decision Rules
// ============================================================================

proptest! {
    /// Injection patterns are flagged regardless of casing and surrounding text
    #[test]
    fn prop_injection_detected(
        prefix in "[a-z ]{0,20}",
        suffix in "[a-z ]{0,20}",
        pattern_index in 0usize..INJECTION_PATTERNS.len(),
        upper in any::<bool>()
    ) {
        let pattern = INJECTION_PATTERNS[pattern_index];
        let pattern = if upper { pattern.to_uppercase() } else { pattern.to_string() };

        let mut payload = Payload::new();
        payload.insert("field".to_string(), Value::String(format!("{prefix}{pattern}{suffix}")));

        let result = PayloadValidator::default().validate("deploy", &payload);
        prop_assert!(!result.valid);
        prop_assert!(result.failed_checks.contains(&"potential_injection_in_field".to_string()));
    }

    /// Nesting a string inside objects and arrays does not hide an injection
    #[test]
    fn prop_nested_injection_detected(
        pattern_index in 0usize..INJECTION_PATTERNS.len(),
        wrappers in prop::collection::vec(any::<bool>(), 1..6)
    ) {
        let mut value = Value::String(format!("x {} y", INJECTION_PATTERNS[pattern_index]));
        for as_array in wrappers {
            value = if as_array {
                serde_json::json!(["clean", value])
            } else {
                serde_json::json!({"clean": 1, "inner": value})
            };
        }

        let mut payload = Payload::new();
        payload.insert("field".to_string(), value);

        let result = PayloadValidator::default().validate("deploy", &payload);
        prop_assert_eq!(result.failed_checks, vec!["potential_injection_in_field".to_string()]);
    }

    /// An injection flag rejects regardless of approvals, score or threat
    #[test]
    fn prop_injection_always_rejects(
        approvals in arb_approvals(),
        score_millis in 0u32..=1000,
        level in arb_threat_level()
    ) {
        let failed = vec!["potential_injection_in_cmd".to_string()];
        let status = decide_status(&failed, &approvals, f64::from(score_millis) / 1000.0, level);
        prop_assert_eq!(status, ValidationStatus::Rejected);
    }

    /// MFA wins over every other outcome once checks pass
    #[test]
    fn prop_mfa_precedes_coe(
        mut approvals in arb_approvals(),
        score_millis in 0u32..=1000,
        level in arb_threat_level()
    ) {
        approvals.retain(|a| *a != ApprovalRequirement::MultiFactorAuthentication);
        approvals.insert(0, ApprovalRequirement::MultiFactorAuthentication);
        let status = decide_status(&[], &approvals, f64::from(score_millis) / 1000.0, level);
        prop_assert_eq!(status, ValidationStatus::RequiresMfa);
    }
}
