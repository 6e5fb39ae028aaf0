//! Idempotency tracker (spec §4.B): deduplicate job execution by run-id
//! across workers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Mutex;

use crate::domain::ports::errors::OrchestratorError;
use crate::services::jsonl::append_jsonl_line;

/// In-memory tracker, sufficient for a single process's workers. Kept as an
/// explicit `Mutex`-guarded set in the teacher's concurrency style rather
/// than reaching for a third-party concurrent-map crate.
#[derive(Default)]
pub struct IdempotencyTracker {
    seen: Mutex<HashSet<String>>,
}

impl IdempotencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic test-and-insert: returns `false` exactly once for any given
    /// id across concurrent callers.
    pub fn is_duplicate(&self, id: &str) -> bool {
        let mut seen = self.seen.lock().expect("idempotency lock poisoned");
        !seen.insert(id.to_string())
    }

    pub fn mark_completed(&self, id: &str) {
        self.seen.lock().expect("idempotency lock poisoned").insert(id.to_string());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CompletionRecord {
    run_id: String,
    completed_at: chrono::DateTime<chrono::Utc>,
    meta: Option<Value>,
}

/// Durable variant: appends a record of completed run-ids to a JSONL log so
/// dedup survives a process restart, while still keeping an in-memory set
/// for the fast-path check.
pub struct DurableIdempotencyTracker {
    memory: IdempotencyTracker,
    log_path: std::path::PathBuf,
}

impl DurableIdempotencyTracker {
    pub async fn load(log_path: impl Into<std::path::PathBuf>) -> Result<Self, OrchestratorError> {
        let log_path = log_path.into();
        let memory = IdempotencyTracker::new();

        if let Ok(contents) = tokio::fs::read_to_string(&log_path).await {
            for line in contents.lines() {
                if let Ok(record) = serde_json::from_str::<CompletionRecord>(line) {
                    memory.mark_completed(&record.run_id);
                }
            }
        }

        Ok(Self { memory, log_path })
    }

    pub fn is_duplicate(&self, id: &str) -> bool {
        self.memory.is_duplicate(id)
    }

    pub async fn mark_completed(&self, id: &str, meta: Option<Value>) -> Result<(), OrchestratorError> {
        self.memory.mark_completed(id);
        let record = CompletionRecord {
            run_id: id.to_string(),
            completed_at: chrono::Utc::now(),
            meta,
        };
        append_jsonl_line(&self.log_path, &record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn is_duplicate_returns_false_exactly_once() {
        let tracker = Arc::new(IdempotencyTracker::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let tracker = Arc::clone(&tracker);
            handles.push(std::thread::spawn(move || tracker.is_duplicate("run-1")));
        }
        let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|dup| !**dup).count(), 1);
    }
}
