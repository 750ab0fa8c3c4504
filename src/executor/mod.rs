//! Secured Execution
//!
//! Runs approved actions under monitoring and records every run in the
//! audit chain.

pub mod monitor;
pub mod secured;

pub use monitor::{ExecutionMonitor, MonitorReport};
pub use secured::{ExecutionOutcome, OutcomeStatus, PostExecutionReport, SecuredExecutor};
