//! Task domain model.
//!
//! A task is a single node in a DAG: either a `workflow` task (dispatched to
//! a registered workflow handler) or a `checkpoint` task (halts execution
//! until a human approves).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Discriminates a workflow task (executes code) from a checkpoint task
/// (halts for human approval).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Workflow,
    Checkpoint,
}

/// A single node in a DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    /// Registry key for the workflow to invoke. Required when `kind ==
    /// Workflow`; must be absent/unused when `kind == Checkpoint`.
    #[serde(default)]
    pub workflow_ref: Option<String>,
    #[serde(default)]
    pub params: HashMap<String, Value>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub retries: u32,
    /// Human-readable approval prompt, used only for checkpoint tasks.
    #[serde(default)]
    pub prompt: Option<String>,
    /// RBAC role required to approve this checkpoint.
    #[serde(default)]
    pub required_role: Option<String>,
    /// Expected input schema for the approval, echoed into the checkpoint.
    #[serde(rename = "inputs", default)]
    pub inputs_schema: HashMap<String, Value>,
    /// Literal signer ids/roles for multi-sign checkpoints.
    #[serde(default)]
    pub required_signers: Vec<String>,
    #[serde(default)]
    pub min_signatures: Option<u32>,
}

impl Task {
    pub fn is_checkpoint(&self) -> bool {
        matches!(self.kind, TaskKind::Checkpoint)
    }
}
