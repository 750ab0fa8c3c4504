//! Per-Agent Rate Limiter
//!
//! Sliding-window action counter. Each agent has a list of recent action
//! timestamps; entries older than the window are pruned on every check.
//! Check-then-record runs under a single lock so two concurrent requests
//! from the same agent can never both pass on the same snapshot.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Default ceiling on actions per agent per window
pub const DEFAULT_MAX_ACTIONS_PER_MINUTE: u32 = 30;

/// Length of the trailing window in seconds
pub const WINDOW_SECS: i64 = 60;

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitResult {
    /// Whether the action is admitted
    pub allowed: bool,

    /// Actions counted in the window after this check
    pub current_count: usize,

    /// Configured ceiling
    pub limit: u32,

    /// Seconds until the oldest entry leaves the window (if denied)
    pub retry_after_secs: Option<u64>,
}

impl RateLimitResult {
    /// Create an allowed result
    pub fn allowed(current_count: usize, limit: u32) -> Self {
        Self {
            allowed: true,
            current_count,
            limit,
            retry_after_secs: None,
        }
    }

    /// Create a denied result
    pub fn denied(current_count: usize, limit: u32, retry_after_secs: u64) -> Self {
        Self {
            allowed: false,
            current_count,
            limit,
            retry_after_secs: Some(retry_after_secs),
        }
    }
}

/// Sliding-window limiter keyed by agent id
#[derive(Debug)]
pub struct RateLimiter {
    max_actions: u32,
    window: Duration,
    history: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl RateLimiter {
    /// Create a limiter admitting `max_actions_per_minute` per agent
    pub fn new(max_actions_per_minute: u32) -> Self {
        Self {
            max_actions: max_actions_per_minute,
            window: Duration::seconds(WINDOW_SECS),
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Configured ceiling
    pub fn limit(&self) -> u32 {
        self.max_actions
    }

    /// Check and, when admitted, record an action for `agent_id` at `now`
    ///
    /// A denied attempt is not recorded, so an agent regains capacity as soon
    /// as old entries leave the window.
    pub fn allow(&self, agent_id: &str, now: DateTime<Utc>) -> RateLimitResult {
        let mut history = self.history.lock();
        let entries = history.entry(agent_id.to_string()).or_default();

        while let Some(oldest) = entries.front() {
            if now - *oldest >= self.window {
                entries.pop_front();
            } else {
                break;
            }
        }

        let count = entries.len();
        if count < self.max_actions as usize {
            entries.push_back(now);
            debug!(agent_id, count = count + 1, limit = self.max_actions, "Rate limit check passed");
            RateLimitResult::allowed(count + 1, self.max_actions)
        } else {
            let retry_after = entries
                .front()
                .map(|oldest| (*oldest + self.window - now).num_seconds().max(0) as u64)
                .unwrap_or(0);
            debug!(agent_id, count, limit = self.max_actions, retry_after, "Rate limit exceeded");
            RateLimitResult::denied(count, self.max_actions, retry_after)
        }
    }

    /// Actions currently counted for an agent (without pruning)
    pub fn current_count(&self, agent_id: &str) -> usize {
        self.history
            .lock()
            .get(agent_id)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// Number of agents with tracked history
    pub fn tracked_agents(&self) -> usize {
        self.history.lock().len()
    }

    /// Drop agents whose every entry has left the window
    pub fn prune_idle(&self, now: DateTime<Utc>) -> usize {
        let mut history = self.history.lock();
        let before = history.len();
        history.retain(|_, entries| {
            entries
                .back()
                .is_some_and(|latest| now - *latest < self.window)
        });
        before - history.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ACTIONS_PER_MINUTE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new(5);
        for i in 0..5 {
            let result = limiter.allow("agent-1", t0() + Duration::seconds(i));
            assert!(result.allowed);
            assert_eq!(result.current_count, i as usize + 1);
        }
    }

    #[test]
    fn test_denies_after_limit() {
        let limiter = RateLimiter::new(3);
        for _ in 0..3 {
            assert!(limiter.allow("agent-1", t0()).allowed);
        }
        let result = limiter.allow("agent-1", t0() + Duration::seconds(10));
        assert!(!result.allowed);
        assert_eq!(result.current_count, 3);
        assert_eq!(result.retry_after_secs, Some(50));
    }

    #[test]
    fn test_denied_attempts_are_not_recorded() {
        let limiter = RateLimiter::new(2);
        limiter.allow("agent-1", t0());
        limiter.allow("agent-1", t0());
        for _ in 0..10 {
            assert!(!limiter.allow("agent-1", t0() + Duration::seconds(5)).allowed);
        }
        assert_eq!(limiter.current_count("agent-1"), 2);

        let later = t0() + Duration::seconds(61);
        assert!(limiter.allow("agent-1", later).allowed);
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.allow("agent-1", t0()).allowed);
        assert!(limiter.allow("agent-1", t0() + Duration::seconds(30)).allowed);
        assert!(!limiter.allow("agent-1", t0() + Duration::seconds(59)).allowed);
        // first entry has left the window
        assert!(limiter.allow("agent-1", t0() + Duration::seconds(61)).allowed);
        assert!(!limiter.allow("agent-1", t0() + Duration::seconds(62)).allowed);
    }

    #[test]
    fn test_agents_are_independent() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.allow("agent-1", t0()).allowed);
        assert!(!limiter.allow("agent-1", t0()).allowed);
        assert!(limiter.allow("agent-2", t0()).allowed);
        assert_eq!(limiter.tracked_agents(), 2);
    }

    #[test]
    fn test_prune_idle() {
        let limiter = RateLimiter::new(5);
        limiter.allow("agent-1", t0());
        limiter.allow("agent-2", t0() + Duration::seconds(50));
        let removed = limiter.prune_idle(t0() + Duration::seconds(70));
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_agents(), 1);
    }

    #[test]
    fn test_concurrent_checks_never_exceed_limit() {
        let limiter = Arc::new(RateLimiter::new(20));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    (0..10)
                        .filter(|_| limiter.allow("agent-shared", t0()).allowed)
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 20);
    }
}
