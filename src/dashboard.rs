//! Security Dashboard
//!
//! Read-only snapshot of validation and audit state for external
//! observability tooling.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::audit::AuditChain;
use crate::validation::{SecurityEvent, ThreatLevel, ValidationOrchestrator};

/// Security events included in a snapshot
pub const DASHBOARD_EVENT_LIMIT: usize = 20;

/// Dashboard snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardData {
    /// Timestamp of data generation
    pub timestamp: DateTime<Utc>,

    pub security_status: SecurityStatus,

    pub action_metrics: ActionMetrics,

    /// Most recent non-approved decisions, newest first
    pub security_events: Vec<SecurityEvent>,

    pub compliance_status: ComplianceStatus,
}

/// Current security posture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityStatus {
    /// Highest threat level decided in the last hour
    pub current_threat_level: ThreatLevel,
    pub zero_trust_mode: bool,
    /// Approvals with an open window
    pub active_validations: usize,
    /// Agents with rate-limit history
    pub tracked_agents: usize,
}

/// Execution and decision counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionMetrics {
    pub total_audit_records: usize,
    pub audits_last_24h: usize,
    pub executions_last_hour: usize,
    pub successful_last_hour: usize,
    /// Completed share of last-hour executions, 0.0 when there were none
    pub success_rate_last_hour: f64,
    /// Logged decisions by validation status
    pub decisions_by_status: BTreeMap<String, usize>,
}

/// Audit trail health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceStatus {
    pub audit_chain_intact: bool,
    pub audit_records: usize,
    pub last_record_hash: Option<String>,
    pub signing_key_fingerprint: String,
}

/// Builds a [`DashboardData`] snapshot
pub struct DashboardBuilder<'a> {
    orchestrator: &'a ValidationOrchestrator,
    audit_chain: &'a AuditChain,
}

impl<'a> DashboardBuilder<'a> {
    /// Snapshot the orchestrator and its audit chain
    pub fn new(orchestrator: &'a ValidationOrchestrator) -> Self {
        Self {
            orchestrator,
            audit_chain: orchestrator.audit_chain(),
        }
    }

    /// Build dashboard data
    pub async fn build(&self) -> DashboardData {
        let now = self.orchestrator.clock().now();
        let hour_ago = now - Duration::hours(1);

        let records = self.audit_chain.records().await;
        let last_hour: Vec<_> = records.iter().filter(|r| r.timestamp >= hour_ago).collect();
        let successful_last_hour = last_hour.iter().filter(|r| r.succeeded()).count();
        let success_rate_last_hour = if last_hour.is_empty() {
            0.0
        } else {
            successful_last_hour as f64 / last_hour.len() as f64
        };

        let mut decisions_by_status = BTreeMap::new();
        for event in self.orchestrator.events().await {
            *decisions_by_status
                .entry(event.status.as_str().to_string())
                .or_insert(0) += 1;
        }

        let mut security_events = self.orchestrator.security_events().await;
        security_events.reverse();
        security_events.truncate(DASHBOARD_EVENT_LIMIT);

        DashboardData {
            timestamp: now,
            security_status: SecurityStatus {
                current_threat_level: self.orchestrator.current_threat_level(hour_ago).await,
                zero_trust_mode: self.orchestrator.zero_trust_mode(),
                active_validations: self.orchestrator.active_validation_count().await,
                tracked_agents: self.orchestrator.tracked_agents(),
            },
            action_metrics: ActionMetrics {
                total_audit_records: records.len(),
                audits_last_24h: records
                    .iter()
                    .filter(|r| r.timestamp >= now - Duration::hours(24))
                    .count(),
                executions_last_hour: last_hour.len(),
                successful_last_hour,
                success_rate_last_hour,
                decisions_by_status,
            },
            security_events,
            compliance_status: ComplianceStatus {
                audit_chain_intact: self.audit_chain.verify_integrity().await,
                audit_records: records.len(),
                last_record_hash: records.last().map(|r| r.record_hash.clone()),
                signing_key_fingerprint: self.audit_chain.key_fingerprint(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{MonitoringConfig, SecurityConfig};
    use crate::context::{ActionSecurityContext, Severity};
    use crate::crypto::SigningKey;
    use crate::executor::SecuredExecutor;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;

    fn key() -> SigningKey {
        SigningKey::from_bytes(b"dashboard-key".to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_empty_dashboard() {
        let config = SecurityConfig::default();
        let chain = Arc::new(AuditChain::new(key()));
        let orchestrator = ValidationOrchestrator::new(&config, key(), chain);

        let data = DashboardBuilder::new(&orchestrator).build().await;
        assert_eq!(data.security_status.current_threat_level, ThreatLevel::Minimal);
        assert!(data.security_status.zero_trust_mode);
        assert_eq!(data.action_metrics.total_audit_records, 0);
        assert_eq!(data.action_metrics.success_rate_last_hour, 0.0);
        assert!(data.security_events.is_empty());
        assert!(data.compliance_status.audit_chain_intact);
        assert!(data.compliance_status.last_record_hash.is_none());
    }

    #[tokio::test]
    async fn test_dashboard_after_activity() {
        let now = Utc.with_ymd_and_hms(2026, 9, 1, 14, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(now));
        let config = SecurityConfig {
            authorized_agents: vec!["agent-1".to_string()],
            ..Default::default()
        };
        let chain = Arc::new(AuditChain::new(key()));
        let orchestrator = Arc::new(
            ValidationOrchestrator::new(&config, key(), chain).with_clock(clock.clone()),
        );
        let executor = SecuredExecutor::new(Arc::clone(&orchestrator), MonitoringConfig::default());

        let ctx = |agent: &str| ActionSecurityContext::new(agent, "read_logs", Severity::Low, "dev", now);
        executor
            .execute(ctx("agent-1"), |_| async { Ok(json!({"ok": true})) })
            .await
            .unwrap();
        executor
            .execute(ctx("agent-1"), |_| async { anyhow::bail!("disk error") })
            .await
            .unwrap();
        executor
            .execute(ctx("intruder"), |_| async { Ok(json!({})) })
            .await
            .unwrap();

        let data = DashboardBuilder::new(&orchestrator).build().await;
        assert_eq!(data.action_metrics.total_audit_records, 2);
        assert_eq!(data.action_metrics.executions_last_hour, 2);
        assert_eq!(data.action_metrics.successful_last_hour, 1);
        assert_eq!(data.action_metrics.success_rate_last_hour, 0.5);
        assert_eq!(data.action_metrics.decisions_by_status["APPROVED"], 2);
        assert_eq!(data.action_metrics.decisions_by_status["REJECTED"], 1);
        assert_eq!(data.security_events.len(), 1);
        assert_eq!(data.security_status.current_threat_level, ThreatLevel::Critical);
        assert!(data.compliance_status.audit_chain_intact);
        assert_eq!(data.compliance_status.audit_records, 2);

        clock.advance(Duration::hours(2));
        let later = DashboardBuilder::new(&orchestrator).build().await;
        assert_eq!(later.action_metrics.executions_last_hour, 0);
        assert_eq!(later.action_metrics.audits_last_24h, 2);
        assert_eq!(later.security_status.current_threat_level, ThreatLevel::Minimal);
    }
}
