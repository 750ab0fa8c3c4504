//! Validation Orchestrator
//!
//! Runs the validation state machine for one action:
//!
//! ```text
//! PENDING -> identity -> rate limit -> payload, threat, score, approvals -> decision
//! ```
//!
//! Identity and rate-limit failures exit early. Everything else feeds the
//! ordered decision rules in [`decide_status`]. Sub-checks return `Result`
//! and any error is converted once, in [`ValidationOrchestrator::validate`],
//! into a fail-closed REJECTED result.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::audit::AuditChain;
use crate::clock::{Clock, SystemClock};
use crate::config::SecurityConfig;
use crate::context::ActionSecurityContext;
use crate::crypto::SigningKey;
use crate::error::Result;
use crate::metrics;
use crate::validation::approvals::{ApprovalRequirement, ApprovalResolver};
use crate::validation::identity::{AllowListIdentityStore, IdentityStore, IdentityVerifier};
use crate::validation::payload::PayloadValidator;
use crate::validation::rate_limit::RateLimiter;
use crate::validation::result::{
    SecurityValidationResult, ValidationStatus, IDENTITY_CHECK_FAILED, RATE_LIMIT_CHECK_FAILED,
};
use crate::validation::scorer::{ScoreInputs, SecurityScorer};
use crate::validation::threat::{ThreatAssessor, ThreatLevel, ACTIVITY_WINDOW};
use crate::validation::token::{TokenSigner, ValidationClaims};

/// Capacity of the in-memory decision log
pub const MAX_SECURITY_EVENTS: usize = 1000;

/// Score below which an action is rejected outright
pub const MIN_APPROVAL_SCORE: f64 = 0.3;

/// Minimum spacing between sweeps of expired cache entries and idle agents
pub const SWEEP_INTERVAL_SECS: i64 = 60;

/// Failed-check substrings that force a rejection
const REJECTING_CHECK_MARKERS: [&str; 3] = ["identity", "injection", "system_error"];

/// One validation decision, kept for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub timestamp: DateTime<Utc>,
    pub action_id: String,
    pub agent_id: String,
    pub action_type: String,
    pub status: ValidationStatus,
    pub threat_level: ThreatLevel,
    pub failed_checks: Vec<String>,
}

/// Apply the ordered decision rules; first match wins
pub fn decide_status(
    failed_checks: &[String],
    required_approvals: &[ApprovalRequirement],
    security_score: f64,
    threat_level: ThreatLevel,
) -> ValidationStatus {
    let rejecting = failed_checks
        .iter()
        .any(|check| REJECTING_CHECK_MARKERS.iter().any(|m| check.contains(m)));

    if rejecting {
        ValidationStatus::Rejected
    } else if required_approvals.contains(&ApprovalRequirement::MultiFactorAuthentication) {
        ValidationStatus::RequiresMfa
    } else if required_approvals.contains(&ApprovalRequirement::CoalitionOfExperts) {
        ValidationStatus::RequiresCoe
    } else if security_score < MIN_APPROVAL_SCORE {
        ValidationStatus::Rejected
    } else if threat_level == ThreatLevel::Critical && required_approvals.is_empty() {
        ValidationStatus::Blocked
    } else {
        ValidationStatus::Approved
    }
}

/// Owns all validation state: rate-limiter history, approval-window cache
/// and the decision log
pub struct ValidationOrchestrator {
    zero_trust_mode: bool,
    identity: IdentityVerifier,
    rate_limiter: RateLimiter,
    threat_assessor: ThreatAssessor,
    payload_validator: PayloadValidator,
    scorer: SecurityScorer,
    approvals: ApprovalResolver,
    signer: TokenSigner,
    audit_chain: Arc<AuditChain>,
    clock: Arc<dyn Clock>,
    active_validations: RwLock<HashMap<String, SecurityValidationResult>>,
    /// Approval tokens already exchanged for an execution, with their expiry
    redeemed_tokens: RwLock<HashMap<String, DateTime<Utc>>>,
    security_events: RwLock<VecDeque<SecurityEvent>>,
    last_sweep: Mutex<Option<DateTime<Utc>>>,
}

impl ValidationOrchestrator {
    /// Build an orchestrator from configuration
    ///
    /// Identity uses the configured allow-list and time comes from the system
    /// clock; both can be replaced with the `with_*` builders.
    pub fn new(config: &SecurityConfig, signing_key: SigningKey, audit_chain: Arc<AuditChain>) -> Self {
        let store: Arc<dyn IdentityStore> =
            Arc::new(AllowListIdentityStore::new(config.authorized_agents.iter().cloned()));

        Self {
            zero_trust_mode: config.zero_trust_mode,
            identity: IdentityVerifier::new(store, config.zero_trust_mode),
            rate_limiter: RateLimiter::new(config.max_action_rate_per_minute),
            threat_assessor: ThreatAssessor::with_offset_minutes(config.local_utc_offset_minutes),
            payload_validator: PayloadValidator::new(config.required_fields.clone()),
            scorer: SecurityScorer,
            approvals: ApprovalResolver::new(config.approval_policy()),
            signer: TokenSigner::new(signing_key),
            audit_chain,
            clock: Arc::new(SystemClock),
            active_validations: RwLock::new(HashMap::new()),
            redeemed_tokens: RwLock::new(HashMap::new()),
            security_events: RwLock::new(VecDeque::new()),
            last_sweep: Mutex::new(None),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the identity store
    pub fn with_identity_store(mut self, store: Arc<dyn IdentityStore>) -> Self {
        self.identity = IdentityVerifier::new(store, self.zero_trust_mode);
        self
    }

    /// Validate an action
    ///
    /// Never fails: internal errors produce a REJECTED result with score 0.0,
    /// threat level CRITICAL and the single failed check
    /// `validation_system_error`. Indicators and checkpoints are appended to
    /// `ctx` as the pipeline runs.
    #[instrument(skip(self, ctx), fields(action_id = %ctx.action_id(), agent_id = %ctx.agent_id()))]
    pub async fn validate(&self, ctx: &mut ActionSecurityContext) -> SecurityValidationResult {
        let started = Instant::now();

        let result = match self.run_pipeline(ctx).await {
            Ok(result) => result,
            Err(e) => {
                metrics::FAIL_CLOSED_TOTAL.inc();
                error!("Validation failed closed: {}", e);
                SecurityValidationResult::system_error(ctx.action_id(), e)
            }
        };

        self.sweep_if_due().await;

        metrics::VALIDATION_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());
        metrics::VALIDATIONS_TOTAL
            .with_label_values(&[result.validation_status.as_str()])
            .inc();

        if result.validation_status.issues_token() {
            self.active_validations
                .write()
                .await
                .insert(result.action_id.clone(), result.clone());
        }
        self.record_event(ctx, &result).await;

        match result.validation_status {
            ValidationStatus::Approved => info!(
                status = %result.validation_status,
                score = result.security_score,
                "Action approved"
            ),
            ValidationStatus::RequiresMfa | ValidationStatus::RequiresCoe => info!(
                status = %result.validation_status,
                score = result.security_score,
                approvals = ?result.required_approval_names(),
                "Action awaiting approval"
            ),
            _ => warn!(
                status = %result.validation_status,
                score = result.security_score,
                failed_checks = ?result.failed_checks,
                "Action denied"
            ),
        }

        result
    }

    async fn run_pipeline(&self, ctx: &mut ActionSecurityContext) -> Result<SecurityValidationResult> {
        let action_id = ctx.action_id().to_string();
        let now = self.clock.now();

        // 1. Identity
        let identity = self.identity.verify(ctx.agent_id())?;
        ctx.push_checkpoint("identity_verification");
        if !identity.verified {
            let mut result = SecurityValidationResult::unsigned(
                action_id,
                ValidationStatus::Rejected,
                0.0,
                ThreatLevel::Critical,
            );
            result.failed_checks.push(IDENTITY_CHECK_FAILED.to_string());
            result.validation_details.identity = Some(identity);
            return Ok(result);
        }

        // 2. Rate limit
        let rate_limit = self.rate_limiter.allow(ctx.agent_id(), now);
        ctx.push_checkpoint("rate_limit_check");
        if !rate_limit.allowed {
            metrics::RATE_LIMITED_TOTAL.inc();
            let mut result = SecurityValidationResult::unsigned(
                action_id,
                ValidationStatus::Blocked,
                0.0,
                ThreatLevel::High,
            );
            result.failed_checks.push(RATE_LIMIT_CHECK_FAILED.to_string());
            result.validation_details.identity = Some(identity);
            result.validation_details.rate_limit = Some(rate_limit);
            return Ok(result);
        }

        // 3. Payload, threat, score, approvals
        let payload = self
            .payload_validator
            .validate(ctx.action_type(), ctx.payload());
        ctx.push_checkpoint("payload_validation");

        let recent = self.audit_chain.recent(ACTIVITY_WINDOW).await;
        let threat = self.threat_assessor.assess(ctx, &recent);
        for indicator in &threat.indicators {
            ctx.push_indicator(indicator.clone());
        }
        ctx.push_checkpoint("threat_assessment");

        let security_score = self.scorer.score(ScoreInputs {
            identity_verified: identity.verified,
            under_rate_limit: rate_limit.allowed,
            payload_valid: payload.valid,
            threat_score: threat.threat_score,
            production: ctx.is_production(),
        });
        ctx.push_checkpoint("security_scoring");

        let required_approvals = self
            .approvals
            .resolve(ctx, threat.threat_level, security_score);
        ctx.push_checkpoint("approval_resolution");

        // 4-9. Decision
        let failed_checks = payload.failed_checks.clone();
        let status = decide_status(
            &failed_checks,
            &required_approvals,
            security_score,
            threat.threat_level,
        );
        debug!(
            %status,
            score = security_score,
            threat_level = %threat.threat_level,
            "Decision reached"
        );

        let mut result =
            SecurityValidationResult::unsigned(action_id, status, security_score, threat.threat_level);
        result.failed_checks = failed_checks;
        result.required_approvals = required_approvals;
        result.validation_details.identity = Some(identity);
        result.validation_details.rate_limit = Some(rate_limit);
        result.validation_details.payload = Some(payload);
        result.validation_details.threat_assessment = Some(threat);

        // 10. Token
        if status.issues_token() {
            let claims = ValidationClaims::new(
                ctx.action_id(),
                ctx.agent_id(),
                status,
                security_score,
                now,
            );
            result.validation_token = Some(self.signer.issue(&claims)?);
            result.issued_at = Some(claims.issued_at);
            result.expires_at = Some(claims.expires_at);
        }
        ctx.push_checkpoint("decision");

        Ok(result)
    }

    async fn record_event(&self, ctx: &ActionSecurityContext, result: &SecurityValidationResult) {
        let event = SecurityEvent {
            timestamp: self.clock.now(),
            action_id: result.action_id.clone(),
            agent_id: ctx.agent_id().to_string(),
            action_type: ctx.action_type().to_string(),
            status: result.validation_status,
            threat_level: result.threat_level,
            failed_checks: result.failed_checks.clone(),
        };

        let mut events = self.security_events.write().await;
        if events.len() == MAX_SECURITY_EVENTS {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Verify a validation token against the signing key and the clock
    pub fn verify_token(&self, token: &str) -> Result<ValidationClaims> {
        self.signer.verify(token, self.clock.now())
    }

    /// Mark an approval token as exchanged for an execution
    ///
    /// Returns `false` when the token was already redeemed. Check and insert
    /// happen under one write lock, so concurrent callers presenting the same
    /// token cannot both succeed.
    pub async fn redeem_token(&self, token: &str, expires_at: DateTime<Utc>) -> bool {
        let mut redeemed = self.redeemed_tokens.write().await;
        if redeemed.contains_key(token) {
            return false;
        }
        redeemed.insert(token.to_string(), expires_at);
        true
    }

    /// Number of redeemed tokens still remembered
    pub async fn redeemed_token_count(&self) -> usize {
        self.redeemed_tokens.read().await.len()
    }

    /// Run [`Self::sweep`] at most once per [`SWEEP_INTERVAL_SECS`]
    async fn sweep_if_due(&self) {
        let now = self.clock.now();
        {
            let mut last = self.last_sweep.lock();
            match *last {
                Some(at) if now - at < Duration::seconds(SWEEP_INTERVAL_SECS) => return,
                _ => *last = Some(now),
            }
        }
        self.sweep().await;
    }

    /// Drop expired cached results, expired redeemed tokens and agents with
    /// no actions left in the rate window
    pub async fn sweep(&self) {
        let now = self.clock.now();
        let evicted = self.evict_expired().await;

        let forgotten = {
            let mut redeemed = self.redeemed_tokens.write().await;
            let before = redeemed.len();
            redeemed.retain(|_, expires_at| now < *expires_at);
            before - redeemed.len()
        };
        let idle = self.rate_limiter.prune_idle(now);

        if evicted + forgotten + idle > 0 {
            debug!(evicted, forgotten, idle, "Swept validation state");
        }
    }

    /// Cached result for an action whose approval window is still open
    pub async fn cached_result(&self, action_id: &str) -> Option<SecurityValidationResult> {
        let now = self.clock.now();
        self.active_validations
            .read()
            .await
            .get(action_id)
            .filter(|result| !result.is_expired(now))
            .cloned()
    }

    /// Drop cached results whose approval window has closed
    pub async fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let mut active = self.active_validations.write().await;
        let before = active.len();
        active.retain(|_, result| !result.is_expired(now));
        let evicted = before - active.len();
        if evicted > 0 {
            debug!("Evicted {} expired validations", evicted);
        }
        evicted
    }

    /// Number of cached results with an open approval window
    pub async fn active_validation_count(&self) -> usize {
        let now = self.clock.now();
        self.active_validations
            .read()
            .await
            .values()
            .filter(|result| !result.is_expired(now))
            .count()
    }

    /// All logged decisions, oldest first
    pub async fn events(&self) -> Vec<SecurityEvent> {
        self.security_events.read().await.iter().cloned().collect()
    }

    /// Logged decisions other than APPROVED, oldest first
    pub async fn security_events(&self) -> Vec<SecurityEvent> {
        self.security_events
            .read()
            .await
            .iter()
            .filter(|event| event.status != ValidationStatus::Approved)
            .cloned()
            .collect()
    }

    /// Highest threat level decided since `since`
    pub async fn current_threat_level(&self, since: DateTime<Utc>) -> ThreatLevel {
        self.security_events
            .read()
            .await
            .iter()
            .filter(|event| event.timestamp >= since)
            .map(|event| event.threat_level)
            .max()
            .unwrap_or(ThreatLevel::Minimal)
    }

    /// Agents with rate-limit history
    pub fn tracked_agents(&self) -> usize {
        self.rate_limiter.tracked_agents()
    }

    pub fn zero_trust_mode(&self) -> bool {
        self.zero_trust_mode
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn audit_chain(&self) -> &Arc<AuditChain> {
        &self.audit_chain
    }
}

impl std::fmt::Debug for ValidationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationOrchestrator")
            .field("identity", &self.identity)
            .field("rate_limiter", &self.rate_limiter)
            .field("threat_assessor", &self.threat_assessor)
            .finish_non_exhaustive()
    }
}
