//! Shared append-only JSONL helpers used by the checkpoint store, audit
//! log, URG index, and idempotency tracker. Every one of those components
//! persists by appending a canonicalised JSON line and rebuilding its
//! in-memory view by scanning the log and keeping the last record per key —
//! the pattern grounded on the teacher's `AuditLogger` and
//! `original_source/.../orchestrator/checkpoints.py`.

use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use tokio::io::AsyncWriteExt;

use crate::domain::ports::errors::OrchestratorError;

/// Append one JSON-serialized line to `path`, creating parent directories
/// as needed, and fsync-ing the write before returning so writes are
/// durable before the caller observes success.
pub async fn append_jsonl_line<T: Serialize + Sync>(path: impl AsRef<Path>, record: &T) -> Result<(), OrchestratorError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| OrchestratorError::fatal(format!("failed to create directory {}: {e}", parent.display())))?;
    }

    let line = serde_json::to_string(record)
        .map_err(|e| OrchestratorError::fatal(format!("failed to serialize record: {e}")))?;

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| OrchestratorError::fatal(format!("failed to open {}: {e}", path.display())))?;

    file.write_all(line.as_bytes())
        .await
        .map_err(|e| OrchestratorError::fatal(format!("failed to write {}: {e}", path.display())))?;
    file.write_all(b"\n")
        .await
        .map_err(|e| OrchestratorError::fatal(format!("failed to write {}: {e}", path.display())))?;
    file.sync_data()
        .await
        .map_err(|e| OrchestratorError::fatal(format!("failed to sync {}: {e}", path.display())))?;

    Ok(())
}

/// Read every line of `path` (if it exists) as `T`, skipping malformed
/// lines, preserving file order.
pub async fn read_jsonl_lines<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>, OrchestratorError> {
    let path = path.as_ref();
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(Vec::new());
    }

    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| OrchestratorError::fatal(format!("failed to read {}: {e}", path.display())))?;

    Ok(contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}
