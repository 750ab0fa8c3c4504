//! Hash-Linked Audit Chain
//!
//! Append-only list of [`AuditRecord`]s. Each record's hash covers the
//! previous record's hash and is HMAC-signed, so any edit to a stored record
//! or any reordering is detected by [`AuditChain::verify_integrity`].
//!
//! Appends are serialized by a single async mutex: the hash link depends on a
//! globally ordered "last record", so two appends can never read the same
//! previous hash. When a durable [`AuditSink`] is attached, the record is
//! written to it before it becomes visible in memory; a sink failure aborts
//! the append and is reported to the caller.

use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::audit::record::AuditRecord;
use crate::audit::sink::{read_jsonl, AuditSink};
use crate::crypto::SigningKey;
use crate::error::{Result, SecurityError};
use crate::metrics;

/// Where and why a chain failed verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainViolation {
    /// Index of the first bad record
    pub index: usize,
    pub audit_id: String,
    pub reason: ViolationKind,
}

/// Kind of integrity failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// `previous_hash` does not match the prior record's hash
    BrokenLink,
    /// Stored hash does not match the recomputed hash
    HashMismatch,
    /// Signature does not verify over the stored hash
    BadSignature,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationKind::BrokenLink => write!(f, "broken link"),
            ViolationKind::HashMismatch => write!(f, "hash mismatch"),
            ViolationKind::BadSignature => write!(f, "bad signature"),
        }
    }
}

/// Append-only audit chain
pub struct AuditChain {
    records: Mutex<Vec<AuditRecord>>,
    key: SigningKey,
    sink: Option<Arc<dyn AuditSink>>,
}

impl AuditChain {
    /// Create an empty in-memory chain
    pub fn new(key: SigningKey) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            key,
            sink: None,
        }
    }

    /// Attach a durable sink that receives every appended record
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Rebuild a chain from already sealed records
    ///
    /// Records are taken as-is; call [`verify_integrity`](Self::verify_integrity)
    /// to check them.
    pub fn from_records(records: Vec<AuditRecord>, key: SigningKey) -> Self {
        Self {
            records: Mutex::new(records),
            key,
            sink: None,
        }
    }

    /// Rebuild a chain from a JSON Lines audit log
    pub async fn load_jsonl(path: impl AsRef<Path>, key: SigningKey) -> Result<Self> {
        let records = read_jsonl(path.as_ref()).await?;
        info!(
            "Loaded {} audit records from {:?}",
            records.len(),
            path.as_ref()
        );
        Ok(Self::from_records(records, key))
    }

    /// Seal and append a record
    ///
    /// Sets `previous_hash`, `record_hash` and `signature`, then returns the
    /// sealed record.
    pub async fn append(&self, mut record: AuditRecord) -> Result<AuditRecord> {
        let mut records = self.records.lock().await;

        record.previous_hash = records.last().map(|last| last.record_hash.clone());
        record.record_hash = record.compute_hash();
        record.signature = self.key.sign(record.record_hash.as_bytes()).map_err(|e| {
            metrics::AUDIT_APPEND_FAILURES_TOTAL.inc();
            SecurityError::AuditAppend(e.to_string())
        })?;

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.write(&record).await {
                metrics::AUDIT_APPEND_FAILURES_TOTAL.inc();
                error!(
                    audit_id = %record.audit_id,
                    action_id = %record.action_id,
                    "Audit sink write failed: {}",
                    e
                );
                return Err(SecurityError::AuditAppend(e.to_string()));
            }
        }

        debug!(
            audit_id = %record.audit_id,
            index = records.len(),
            "Appended audit record"
        );
        metrics::AUDIT_RECORDS_TOTAL.inc();
        records.push(record.clone());
        Ok(record)
    }

    /// Walk the chain from the first record, checking links, hashes and signatures
    pub async fn verify_integrity(&self) -> bool {
        let records = self.records.lock().await;
        Self::verify_records(&records, &self.key)
    }

    /// Verify a sequence of sealed records with `key`
    pub fn verify_records(records: &[AuditRecord], key: &SigningKey) -> bool {
        match Self::find_violation(records, key) {
            None => true,
            Some(violation) => {
                warn!(
                    index = violation.index,
                    audit_id = %violation.audit_id,
                    "Audit chain verification failed: {}",
                    violation.reason
                );
                false
            }
        }
    }

    /// First record that fails verification, if any
    pub fn find_violation(records: &[AuditRecord], key: &SigningKey) -> Option<ChainViolation> {
        let mut previous: Option<&str> = None;

        for (index, record) in records.iter().enumerate() {
            let violation = |reason| ChainViolation {
                index,
                audit_id: record.audit_id.clone(),
                reason,
            };

            if record.previous_hash.as_deref() != previous {
                return Some(violation(ViolationKind::BrokenLink));
            }
            if record.compute_hash() != record.record_hash {
                return Some(violation(ViolationKind::HashMismatch));
            }
            if !key.verify(record.record_hash.as_bytes(), &record.signature) {
                return Some(violation(ViolationKind::BadSignature));
            }

            previous = Some(record.record_hash.as_str());
        }

        None
    }

    /// The last `n` records, oldest first
    pub async fn recent(&self, n: usize) -> Vec<AuditRecord> {
        let records = self.records.lock().await;
        records[records.len().saturating_sub(n)..].to_vec()
    }

    /// Records with a timestamp at or after `since`
    pub async fn records_since(&self, since: DateTime<Utc>) -> Vec<AuditRecord> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| r.timestamp >= since)
            .cloned()
            .collect()
    }

    /// Snapshot of every record
    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }

    /// Hash of the last record
    pub async fn last_hash(&self) -> Option<String> {
        self.records
            .lock()
            .await
            .last()
            .map(|r| r.record_hash.clone())
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Fingerprint of the signing key, safe to display
    pub fn key_fingerprint(&self) -> String {
        self.key.fingerprint()
    }
}

impl std::fmt::Debug for AuditChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditChain")
            .field("key", &self.key)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}
