//! Agent Identity Verification
//!
//! Allow-list based identity check. The lookup sits behind [`IdentityStore`]
//! so a host can back it with its own credential store; a store failure is a
//! system error and fails the validation closed.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;

/// Lookup contract for known agents
pub trait IdentityStore: Send + Sync {
    /// Whether `agent_id` is a registered agent
    fn is_registered(&self, agent_id: &str) -> Result<bool>;

    /// Number of registered agents
    fn len(&self) -> usize;

    /// Whether no agents are registered
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory allow-list
#[derive(Debug, Clone, Default)]
pub struct AllowListIdentityStore {
    agents: HashSet<String>,
}

impl AllowListIdentityStore {
    /// Create an allow-list from agent ids
    pub fn new<I, S>(agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            agents: agents.into_iter().map(Into::into).collect(),
        }
    }
}

impl IdentityStore for AllowListIdentityStore {
    fn is_registered(&self, agent_id: &str) -> Result<bool> {
        Ok(self.agents.contains(agent_id))
    }

    fn len(&self) -> usize {
        self.agents.len()
    }
}

/// Outcome of the identity check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCheckResult {
    pub agent_id: String,
    pub verified: bool,
    pub zero_trust_mode: bool,
    /// Why verification failed
    pub reason: Option<String>,
}

/// Verifies agent identity against an [`IdentityStore`]
///
/// In zero-trust mode an empty store admits nobody. Outside zero-trust mode an
/// empty store admits every non-empty agent id.
#[derive(Clone)]
pub struct IdentityVerifier {
    store: Arc<dyn IdentityStore>,
    zero_trust_mode: bool,
}

impl IdentityVerifier {
    pub fn new(store: Arc<dyn IdentityStore>, zero_trust_mode: bool) -> Self {
        Self {
            store,
            zero_trust_mode,
        }
    }

    /// Check an agent id
    pub fn verify(&self, agent_id: &str) -> Result<IdentityCheckResult> {
        let (verified, reason) = if agent_id.trim().is_empty() {
            (false, Some("empty agent id".to_string()))
        } else if self.store.is_registered(agent_id)? {
            (true, None)
        } else if self.store.is_empty() && !self.zero_trust_mode {
            (true, None)
        } else {
            (false, Some("agent is not on the allow-list".to_string()))
        };

        debug!(agent_id, verified, "Identity check");
        Ok(IdentityCheckResult {
            agent_id: agent_id.to_string(),
            verified,
            zero_trust_mode: self.zero_trust_mode,
            reason,
        })
    }
}

impl std::fmt::Debug for IdentityVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityVerifier")
            .field("registered_agents", &self.store.len())
            .field("zero_trust_mode", &self.zero_trust_mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SecurityError;

    struct BrokenStore;

    impl IdentityStore for BrokenStore {
        fn is_registered(&self, _agent_id: &str) -> Result<bool> {
            Err(SecurityError::IdentityStore("connection refused".to_string()))
        }

        fn len(&self) -> usize {
            1
        }
    }

    fn verifier(agents: &[&str], zero_trust: bool) -> IdentityVerifier {
        IdentityVerifier::new(
            Arc::new(AllowListIdentityStore::new(agents.iter().copied())),
            zero_trust,
        )
    }

    #[test]
    fn test_known_agent_verified() {
        let result = verifier(&["agent-1"], true).verify("agent-1").unwrap();
        assert!(result.verified);
        assert!(result.reason.is_none());
    }

    #[test]
    fn test_unknown_agent_rejected() {
        let result = verifier(&["agent-1"], false).verify("agent-2").unwrap();
        assert!(!result.verified);
        assert!(result.reason.is_some());
    }

    #[test]
    fn test_empty_allow_list_depends_on_zero_trust() {
        assert!(!verifier(&[], true).verify("agent-1").unwrap().verified);
        assert!(verifier(&[], false).verify("agent-1").unwrap().verified);
    }

    #[test]
    fn test_empty_agent_id_never_verified() {
        assert!(!verifier(&[], false).verify("  ").unwrap().verified);
    }

    #[test]
    fn test_store_error_propagates() {
        let verifier = IdentityVerifier::new(Arc::new(BrokenStore), true);
        assert!(matches!(
            verifier.verify("agent-1"),
            Err(SecurityError::IdentityStore(_))
        ));
    }
}
