//! Secured Executor
//!
//! Validates an action, runs it only when approved, and records the run in
//! the audit chain.
//!
//! - REJECTED / BLOCKED: return immediately, nothing is audited
//! - REQUIRES_MFA / REQUIRES_COE: return the pending status and token without running
//! - APPROVED: run the action next to an [`ExecutionMonitor`], post-check the
//!   result, append one audit record
//!
//! Errors and panics from the action are captured as a `failed` outcome and
//! still audited. The only error returned to the caller is an audit append
//! failure.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::audit::{AuditChain, AuditRecord, ExecutionStatus};
use crate::config::MonitoringConfig;
use crate::context::ActionSecurityContext;
use crate::error::Result;
use crate::executor::monitor::{ExecutionMonitor, MonitorReport};
use crate::metrics;
use crate::validation::{SecurityValidationResult, ValidationOrchestrator, ValidationStatus};

/// Error substrings treated as a suspicious post-execution signal
const SUSPICIOUS_ERROR_MARKERS: [&str; 3] = ["access denied", "unauthorized", "forbidden"];

/// How a secured execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Ran and returned a result
    Completed,
    /// Ran and returned an error or panicked
    Failed,
    /// Validation rejected the action
    Rejected,
    /// Validation blocked the action for now
    Blocked,
    /// Waiting for multi-factor authentication
    RequiresMfa,
    /// Waiting for Coalition-of-Experts review
    RequiresCoe,
}

impl OutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeStatus::Completed => "completed",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::Rejected => "rejected",
            OutcomeStatus::Blocked => "blocked",
            OutcomeStatus::RequiresMfa => "requires_mfa",
            OutcomeStatus::RequiresCoe => "requires_coe",
        }
    }

    fn from_validation(status: ValidationStatus) -> Self {
        match status {
            ValidationStatus::Blocked => OutcomeStatus::Blocked,
            ValidationStatus::RequiresMfa => OutcomeStatus::RequiresMfa,
            ValidationStatus::RequiresCoe => OutcomeStatus::RequiresCoe,
            _ => OutcomeStatus::Rejected,
        }
    }
}

impl From<ExecutionStatus> for OutcomeStatus {
    fn from(status: ExecutionStatus) -> Self {
        match status {
            ExecutionStatus::Completed => OutcomeStatus::Completed,
            ExecutionStatus::Failed => OutcomeStatus::Failed,
        }
    }
}

/// Soft checks on a finished action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostExecutionReport {
    /// The action produced a JSON object, or failed with an error message
    pub well_formed: bool,
    /// Suspicious markers found in error text
    pub suspicious_errors: Vec<String>,
}

impl PostExecutionReport {
    fn check(result: Option<&Value>, error: Option<&str>) -> Self {
        let well_formed = match result {
            Some(Value::Object(_)) => true,
            Some(_) => false,
            None => error.is_some(),
        };

        let mut texts: Vec<String> = error.map(|e| vec![e.to_lowercase()]).unwrap_or_default();
        if let Some(Value::Object(fields)) = result {
            texts.extend(
                fields
                    .iter()
                    .filter(|(key, _)| key.to_lowercase().contains("error"))
                    .filter_map(|(_, value)| value.as_str())
                    .map(str::to_lowercase),
            );
        }

        let suspicious_errors = SUSPICIOUS_ERROR_MARKERS
            .iter()
            .filter(|marker| texts.iter().any(|text| text.contains(*marker)))
            .map(|marker| marker.to_string())
            .collect();

        Self {
            well_formed,
            suspicious_errors,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.well_formed && self.suspicious_errors.is_empty()
    }
}

/// Result of [`SecuredExecutor::execute`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: OutcomeStatus,
    /// Audit record id, set when the action ran
    pub audit_id: Option<String>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub failed_checks: Vec<String>,
    pub required_approvals: Vec<String>,
    /// Token to present on the follow-up call for pending approvals
    pub validation_token: Option<String>,
    pub validation: SecurityValidationResult,
    pub monitor: Option<MonitorReport>,
    pub post_execution: Option<PostExecutionReport>,
}

impl ExecutionOutcome {
    /// Outcome for an action that did not run
    fn not_run(validation: SecurityValidationResult) -> Self {
        Self {
            status: OutcomeStatus::from_validation(validation.validation_status),
            audit_id: None,
            result: None,
            error: None,
            failed_checks: validation.failed_checks.clone(),
            required_approvals: validation.required_approval_names(),
            validation_token: validation.validation_token.clone(),
            validation,
            monitor: None,
            post_execution: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == OutcomeStatus::Completed
    }

    pub fn ran(&self) -> bool {
        self.audit_id.is_some()
    }
}

/// Validates, runs and audits agent actions
pub struct SecuredExecutor {
    orchestrator: Arc<ValidationOrchestrator>,
    audit_chain: Arc<AuditChain>,
    monitoring: MonitoringConfig,
}

impl SecuredExecutor {
    /// Create an executor that audits into the orchestrator's chain
    pub fn new(orchestrator: Arc<ValidationOrchestrator>, monitoring: MonitoringConfig) -> Self {
        let audit_chain = Arc::clone(orchestrator.audit_chain());
        Self {
            orchestrator,
            audit_chain,
            monitoring,
        }
    }

    pub fn orchestrator(&self) -> &Arc<ValidationOrchestrator> {
        &self.orchestrator
    }

    /// Validate and, if approved, run `action`
    #[instrument(skip(self, ctx, action), fields(action_id = %ctx.action_id(), agent_id = %ctx.agent_id()))]
    pub async fn execute<F, Fut>(&self, mut ctx: ActionSecurityContext, action: F) -> Result<ExecutionOutcome>
    where
        F: FnOnce(ActionSecurityContext) -> Fut + Send,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let validation = self.orchestrator.validate(&mut ctx).await;
        self.dispatch(ctx, validation, action).await
    }

    /// Run an action that is waiting for approval, presenting the token from
    /// the first call
    ///
    /// The action is re-validated. If it is still pending and the token is
    /// valid, unexpired, and was issued for the same action id, agent id and
    /// pending status, the approval is taken as granted and the action runs.
    /// A token is redeemed by the first run it admits and refused afterwards.
    /// Otherwise the pending outcome is returned with the reason in `error`.
    #[instrument(skip(self, ctx, token, action), fields(action_id = %ctx.action_id(), agent_id = %ctx.agent_id()))]
    pub async fn execute_with_token<F, Fut>(
        &self,
        mut ctx: ActionSecurityContext,
        token: &str,
        action: F,
    ) -> Result<ExecutionOutcome>
    where
        F: FnOnce(ActionSecurityContext) -> Fut + Send,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let validation = self.orchestrator.validate(&mut ctx).await;
        if !validation.validation_status.is_pending_approval() {
            return self.dispatch(ctx, validation, action).await;
        }

        match self.accept_approval_token(&ctx, &validation, token).await {
            Ok(()) => {
                info!(status = %validation.validation_status, "Approval token accepted");
                self.run_approved(ctx, validation, action).await
            }
            Err(reason) => {
                warn!(status = %validation.validation_status, "Approval token refused: {}", reason);
                let mut outcome = ExecutionOutcome::not_run(validation);
                outcome.error = Some(reason);
                Ok(outcome)
            }
        }
    }

    async fn accept_approval_token(
        &self,
        ctx: &ActionSecurityContext,
        validation: &SecurityValidationResult,
        token: &str,
    ) -> std::result::Result<(), String> {
        let claims = self
            .orchestrator
            .verify_token(token)
            .map_err(|e| e.to_string())?;

        if claims.action_id != ctx.action_id() {
            return Err(format!("token was issued for action {}", claims.action_id));
        }
        if claims.agent_id != ctx.agent_id() {
            return Err(format!("token was issued to agent {}", claims.agent_id));
        }
        if claims.status != validation.validation_status {
            return Err(format!(
                "token status {} does not match pending status {}",
                claims.status, validation.validation_status
            ));
        }
        if !self.orchestrator.redeem_token(token, claims.expires_at).await {
            return Err(format!("token for action {} has already been redeemed", claims.action_id));
        }
        Ok(())
    }

    async fn dispatch<F, Fut>(
        &self,
        ctx: ActionSecurityContext,
        validation: SecurityValidationResult,
        action: F,
    ) -> Result<ExecutionOutcome>
    where
        F: FnOnce(ActionSecurityContext) -> Fut + Send,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        if validation.is_approved() {
            return self.run_approved(ctx, validation, action).await;
        }

        let outcome = ExecutionOutcome::not_run(validation);
        metrics::EXECUTIONS_TOTAL
            .with_label_values(&[outcome.status.as_str()])
            .inc();
        info!(status = outcome.status.as_str(), "Action not executed");
        Ok(outcome)
    }

    async fn run_approved<F, Fut>(
        &self,
        ctx: ActionSecurityContext,
        validation: SecurityValidationResult,
        action: F,
    ) -> Result<ExecutionOutcome>
    where
        F: FnOnce(ActionSecurityContext) -> Fut + Send,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let clock = self.orchestrator.clock();
        let cancel = CancellationToken::new();
        let monitor = ExecutionMonitor::new(
            ctx.action_id(),
            self.monitoring.poll_interval(),
            self.monitoring.max_duration(),
            Arc::clone(&clock),
        )
        .with_validation_expiry(validation.expires_at)
        .spawn(cancel.clone());

        let started = Instant::now();
        let joined = tokio::spawn(action(ctx.clone())).await;
        let elapsed = started.elapsed();

        cancel.cancel();
        let monitor_report = monitor.await.unwrap_or_else(|e| {
            warn!("Monitor task ended abnormally: {}", e);
            MonitorReport::default()
        });

        let (status, result, error) = match joined {
            Ok(Ok(value)) => (ExecutionStatus::Completed, Some(value), None),
            Ok(Err(e)) => (ExecutionStatus::Failed, None, Some(format!("{:#}", e))),
            Err(e) if e.is_panic() => (ExecutionStatus::Failed, None, Some("action panicked".to_string())),
            Err(e) => (ExecutionStatus::Failed, None, Some(e.to_string())),
        };

        let post_execution = PostExecutionReport::check(result.as_ref(), error.as_deref());
        if !post_execution.is_clean() {
            warn!(
                well_formed = post_execution.well_formed,
                suspicious = ?post_execution.suspicious_errors,
                "Post-execution checks raised concerns"
            );
        }

        let execution_result = json!({
            "result": result,
            "error": error,
            "post_execution": post_execution,
            "monitor": monitor_report,
        });
        let record = AuditRecord::new(
            ctx,
            validation.clone(),
            status,
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            execution_result,
            clock.now(),
        );
        let record = self.audit_chain.append(record).await?;

        metrics::EXECUTIONS_TOTAL
            .with_label_values(&[status.as_str()])
            .inc();
        metrics::EXECUTION_DURATION_SECONDS
            .with_label_values(&[status.as_str()])
            .observe(elapsed.as_secs_f64());
        info!(
            audit_id = %record.audit_id,
            status = status.as_str(),
            duration_ms = record.duration_ms,
            "Action executed"
        );

        Ok(ExecutionOutcome {
            status: status.into(),
            audit_id: Some(record.audit_id),
            result,
            error,
            failed_checks: validation.failed_checks.clone(),
            required_approvals: validation.required_approval_names(),
            validation_token: validation.validation_token.clone(),
            validation,
            monitor: Some(monitor_report),
            post_execution: Some(post_execution),
        })
    }
}

impl std::fmt::Debug for SecuredExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecuredExecutor")
            .field("monitoring", &self.monitoring)
            .finish_non_exhaustive()
    }
}
