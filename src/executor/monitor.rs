//! Execution Monitor
//!
//! Polls on a fixed interval while an approved action runs. The monitor is
//! bound to one execution: the executor cancels it through a
//! [`CancellationToken`] as soon as the action finishes, and cancellation is
//! a normal exit. If the hard ceiling elapses first the monitor stops on its
//! own and leaves the action running.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::metrics;

/// Anomaly raised when the approval window closes mid-run
pub const WINDOW_EXPIRED_ANOMALY: &str = "validation_window_expired";

/// Anomaly raised when monitoring hits its ceiling
pub const CEILING_REACHED_ANOMALY: &str = "monitoring_ceiling_reached";

/// What the monitor observed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorReport {
    /// Completed poll cycles
    pub polls: u64,
    pub anomalies: Vec<String>,
    pub ceiling_reached: bool,
}

/// Monitoring task for one execution
pub struct ExecutionMonitor {
    action_id: String,
    poll_interval: Duration,
    max_duration: Duration,
    validation_expires_at: Option<DateTime<Utc>>,
    clock: Arc<dyn Clock>,
}

impl ExecutionMonitor {
    pub fn new(
        action_id: impl Into<String>,
        poll_interval: Duration,
        max_duration: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            action_id: action_id.into(),
            poll_interval,
            max_duration,
            validation_expires_at: None,
            clock,
        }
    }

    /// Flag the run if it outlives this approval window
    pub fn with_validation_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.validation_expires_at = expires_at;
        self
    }

    /// Start polling until `cancel` fires or the ceiling elapses
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<MonitorReport> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(self, cancel: CancellationToken) -> MonitorReport {
        let mut report = MonitorReport::default();
        let deadline = Instant::now() + self.max_duration;

        let mut ticker = tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(action_id = %self.action_id, polls = report.polls, "Monitor cancelled");
                    break;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(action_id = %self.action_id, "Monitoring ceiling reached, action still running");
                    self.raise(&mut report, CEILING_REACHED_ANOMALY);
                    report.ceiling_reached = true;
                    break;
                }
                _ = ticker.tick() => {
                    report.polls += 1;
                    self.poll(&mut report);
                }
            }
        }

        report
    }

    fn poll(&self, report: &mut MonitorReport) {
        if let Some(expires_at) = self.validation_expires_at {
            if self.clock.now() >= expires_at {
                warn!(action_id = %self.action_id, "Action outlived its validation window");
                self.raise(report, WINDOW_EXPIRED_ANOMALY);
            }
        }
    }

    fn raise(&self, report: &mut MonitorReport, anomaly: &str) {
        if report.anomalies.iter().any(|a| a == anomaly) {
            return;
        }
        metrics::MONITOR_ANOMALIES_TOTAL
            .with_label_values(&[anomaly])
            .inc();
        report.anomalies.push(anomaly.to_string());
    }
}
