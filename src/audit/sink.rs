//! Durable Audit Sinks
//!
//! A sink receives every record as it is appended, in chain order. The
//! bundled [`JsonlAuditSink`] writes one JSON object per line so a chain can
//! be rebuilt and re-verified from cold storage.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::audit::record::AuditRecord;
use crate::error::{Result, SecurityError};

/// Destination for appended audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist one record; an error aborts the append
    async fn write(&self, record: &AuditRecord) -> Result<()>;
}

/// Appends records to a JSON Lines file
#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditSink {
    /// Open (or create) the file in append mode
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        debug!("Opened audit log at {:?}", path);
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn write(&self, record: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Read every record from a JSON Lines audit log, in file order
pub async fn read_jsonl(path: impl AsRef<Path>) -> Result<Vec<AuditRecord>> {
    let content = tokio::fs::read_to_string(path.as_ref()).await?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|e| {
                SecurityError::AuditAppend(format!("line {}: malformed audit record: {}", index + 1, e))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::record::tests::sample_record;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_and_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit").join("chain.jsonl");
        let sink = JsonlAuditSink::open(&path).await.unwrap();

        sink.write(&sample_record("act-1", "agent-1")).await.unwrap();
        sink.write(&sample_record("act-2", "agent-2")).await.unwrap();

        let records = read_jsonl(&path).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action_id, "act-1");
        assert_eq!(records[1].agent_id, "agent-2");
    }

    #[tokio::test]
    async fn test_reopen_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chain.jsonl");

        JsonlAuditSink::open(&path)
            .await
            .unwrap()
            .write(&sample_record("act-1", "agent-1"))
            .await
            .unwrap();
        JsonlAuditSink::open(&path)
            .await
            .unwrap()
            .write(&sample_record("act-2", "agent-1"))
            .await
            .unwrap();

        assert_eq!(read_jsonl(&path).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_line_reports_position() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chain.jsonl");
        tokio::fs::write(&path, "{\"not\": \"a record\"}\n").await.unwrap();

        let err = read_jsonl(&path).await.unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
