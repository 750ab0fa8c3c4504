//! Tamper-Evident Audit Trail
//!
//! Every executed action leaves one signed, hash-linked [`AuditRecord`].
//!
//! # Features
//!
//! - SHA-256 hash chain with HMAC-SHA256 signatures
//! - Serialized appends (a valid linearization of all callers)
//! - Optional durable JSON Lines sink
//! - Cold-storage verification of persisted chains

pub mod chain;
pub mod record;
pub mod sink;

pub use chain::{AuditChain, ChainViolation, ViolationKind};
pub use record::{AuditRecord, ExecutionStatus};
pub use sink::{read_jsonl, AuditSink, JsonlAuditSink};
