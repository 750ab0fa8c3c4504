//! ActionGuard Library
//!
//! Security validation, secured execution and a tamper-evident audit trail
//! for actions requested by autonomous agents.
//!
//! - [`validation::ValidationOrchestrator`] decides whether an action may run
//! - [`executor::SecuredExecutor`] runs approved actions under monitoring
//! - [`audit::AuditChain`] records every run in a signed hash chain
//! - [`dashboard::DashboardBuilder`] reports a read-only snapshot

pub mod audit;
pub mod clock;
pub mod config;
pub mod context;
pub mod crypto;
pub mod dashboard;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod validation;

pub use error::{Result, SecurityError};
