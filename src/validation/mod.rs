//! Action Validation Pipeline
//!
//! Decides whether an agent action may run.
//!
//! # Features
//!
//! - **Identity**: allow-list verification behind a pluggable store
//! - **Rate limiting**: sliding 60 second window per agent, atomic check-then-record
//! - **Payload checks**: injection patterns, oversized fields, required fields
//! - **Threat assessment**: deterministic additive scoring over context signals
//! - **Scoring and approvals**: MFA, Coalition-of-Experts, officer review, enhanced verification
//! - **Signed tokens**: HMAC-SHA256 tokens with a 15 minute approval window
//! - **Fail-closed**: any internal error becomes a REJECTED decision

pub mod approvals;
pub mod identity;
pub mod orchestrator;
pub mod payload;
pub mod rate_limit;
pub mod result;
pub mod scorer;
pub mod threat;
pub mod token;

#[cfg(test)]
mod proptests;

pub use approvals::{ApprovalPolicy, ApprovalRequirement, ApprovalResolver};
pub use identity::{AllowListIdentityStore, IdentityCheckResult, IdentityStore, IdentityVerifier};
pub use orchestrator::{decide_status, SecurityEvent, ValidationOrchestrator};
pub use payload::{PayloadCheckResult, PayloadValidator};
pub use rate_limit::{RateLimitResult, RateLimiter};
pub use result::{SecurityValidationResult, ValidationDetails, ValidationStatus};
pub use scorer::{ScoreInputs, SecurityScorer};
pub use threat::{ThreatAssessmentResult, ThreatAssessor, ThreatLevel};
pub use token::{TokenSigner, ValidationClaims};
