//! DagRun domain model: the mutable execution state of one DAG invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DagRunStatus {
    Running,
    Paused,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagRun {
    pub run_id: String,
    pub dag_name: String,
    pub tenant: String,
    pub status: DagRunStatus,
    pub task_outputs: HashMap<String, HashMap<String, Value>>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl DagRun {
    pub fn new(run_id: impl Into<String>, dag_name: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            dag_name: dag_name.into(),
            tenant: tenant.into(),
            status: DagRunStatus::Running,
            task_outputs: HashMap::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }
}
