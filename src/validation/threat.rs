//! Threat Assessment
//!
//! Additive scoring over contextual signals:
//!
//! | Signal                                         | Weight |
//! |------------------------------------------------|--------|
//! | local hour before 06:00 or after 22:00         | 0.2    |
//! | agent has > 20 of the last 50 audit records     | 0.3    |
//! | severity CRITICAL or EMERGENCY                 | 0.4    |
//! | environment is "production"                    | 0.1    |
//!
//! Weights are summed in tenths so threshold comparisons are exact.

use chrono::{FixedOffset, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::audit::AuditRecord;
use crate::context::ActionSecurityContext;

/// Number of most recent audit records inspected for activity
pub const ACTIVITY_WINDOW: usize = 50;

/// Actions within the window above which an agent counts as highly active
pub const HIGH_ACTIVITY_THRESHOLD: usize = 20;

/// Computed, context-derived risk tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatLevel {
    Minimal = 0,
    Low = 1,
    Moderate = 2,
    High = 3,
    Critical = 4,
}

impl ThreatLevel {
    /// Map a threat score in tenths to a level
    fn from_tenths(tenths: u32) -> Self {
        match tenths {
            t if t >= 8 => ThreatLevel::Critical,
            t if t >= 6 => ThreatLevel::High,
            t if t >= 4 => ThreatLevel::Moderate,
            t if t >= 2 => ThreatLevel::Low,
            _ => ThreatLevel::Minimal,
        }
    }

    /// HIGH or CRITICAL
    pub fn is_elevated(self) -> bool {
        matches!(self, ThreatLevel::High | ThreatLevel::Critical)
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreatLevel::Minimal => write!(f, "MINIMAL"),
            ThreatLevel::Low => write!(f, "LOW"),
            ThreatLevel::Moderate => write!(f, "MODERATE"),
            ThreatLevel::High => write!(f, "HIGH"),
            ThreatLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Output of a threat assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatAssessmentResult {
    /// Score in [0, 1]
    pub threat_score: f64,
    pub threat_level: ThreatLevel,
    /// Signals that contributed to the score, in evaluation order
    pub indicators: Vec<String>,
    /// Actions by this agent among the inspected audit records
    pub recent_agent_actions: usize,
}

/// Computes threat score and level from a context and recent audit history
#[derive(Debug, Clone)]
pub struct ThreatAssessor {
    local_offset: FixedOffset,
}

impl ThreatAssessor {
    /// Create an assessor whose "local" hour uses the given UTC offset
    pub fn new(local_offset: FixedOffset) -> Self {
        Self { local_offset }
    }

    /// Create an assessor from an offset in minutes east of UTC
    ///
    /// Out-of-range offsets fall back to UTC.
    pub fn with_offset_minutes(minutes: i32) -> Self {
        let offset = minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix());
        Self::new(offset)
    }

    /// Assess a context against the most recent audit records
    ///
    /// Only the last [`ACTIVITY_WINDOW`] entries of `recent` are inspected.
    pub fn assess(
        &self,
        ctx: &ActionSecurityContext,
        recent: &[AuditRecord],
    ) -> ThreatAssessmentResult {
        let mut tenths = 0u32;
        let mut indicators = Vec::new();

        let hour = ctx.timestamp().with_timezone(&self.local_offset).hour();
        if !(6..=22).contains(&hour) {
            tenths += 2;
            indicators.push("after_hours_activity".to_string());
        }

        let window = &recent[recent.len().saturating_sub(ACTIVITY_WINDOW)..];
        let recent_agent_actions = window
            .iter()
            .filter(|record| record.agent_id == ctx.agent_id())
            .count();
        if recent_agent_actions > HIGH_ACTIVITY_THRESHOLD {
            tenths += 3;
            indicators.push("high_activity_agent".to_string());
        }

        if ctx.severity().is_critical_or_above() {
            tenths += 4;
            indicators.push("critical_severity".to_string());
        }

        if ctx.is_production() {
            tenths += 1;
            indicators.push("production_environment".to_string());
        }

        let tenths = tenths.min(10);
        ThreatAssessmentResult {
            threat_score: f64::from(tenths) / 10.0,
            threat_level: ThreatLevel::from_tenths(tenths),
            indicators,
            recent_agent_actions,
        }
    }
}

impl Default for ThreatAssessor {
    fn default() -> Self {
        Self::with_offset_minutes(0)
    }
}
