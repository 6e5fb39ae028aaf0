//! Checkpoint domain model: the human-in-the-loop approval gate.
//!
//! Mirrors the record shape written by `original_source/.../orchestrator/
//! checkpoints.py`: an append-only JSONL log where the last record per
//! `checkpoint_id` is the current state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

/// One signature recorded against a multi-sign checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub user: String,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub data: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub dag_run_id: String,
    pub task_id: String,
    pub tenant: String,
    pub prompt: String,
    pub required_role: String,
    #[serde(default)]
    pub required_signers: Vec<String>,
    #[serde(default = "one")]
    pub min_signatures: u32,
    #[serde(default)]
    pub inputs_schema: HashMap<String, Value>,
    pub status: CheckpointStatus,
    #[serde(default)]
    pub approvals: Vec<Approval>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub approval_data: Option<HashMap<String, Value>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

fn one() -> u32 {
    1
}

impl Checkpoint {
    /// True iff (a) `min_signatures <= 1` and at least one approval exists,
    /// or (b) at least `min_signatures` distinct signers from
    /// `required_signers` have approved. Literal-signer matching only —
    /// role-based signer resolution is an Open Question left unresolved by
    /// the spec (see DESIGN.md).
    pub fn is_satisfied(&self) -> bool {
        if self.required_signers.is_empty() || self.min_signatures <= 1 {
            return !self.approvals.is_empty();
        }

        let valid_count = self
            .approvals
            .iter()
            .filter(|a| self.required_signers.contains(&a.user))
            .count() as u32;

        valid_count >= self.min_signatures
    }

    pub fn has_signed(&self, user: &str) -> bool {
        self.approvals.iter().any(|a| a.user == user)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// The single latest resume marker for a paused `DagRun`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeToken {
    pub dag_run_id: String,
    pub next_task_id: Option<String>,
    pub tenant: String,
    pub ts: DateTime<Utc>,
}
