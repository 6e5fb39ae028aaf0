//! Job domain model for the persistent queue (spec §4.D).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::dag::Dag;

/// Where the DAG for this job comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DagSource {
    Path(String),
    Inline(Dag),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Retry,
    Success,
    Failed,
}

/// Latency-sensitivity hint (from `queue_strategy.py`'s `TaskClass`), used
/// only to pick a default lease/visibility window. The full hybrid
/// SQS/Pub-Sub routing that hint originally drove is a connector wire
/// protocol and stays out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskClass {
    Realtime,
    Bulk,
}

impl Default for TaskClass {
    fn default() -> Self {
        Self::Bulk
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub dag: DagSource,
    pub tenant_id: String,
    #[serde(default)]
    pub schedule_id: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub task_class: TaskClass,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub attempts: u32,
    pub status: JobStatus,
    #[serde(default)]
    pub lease_until: Option<DateTime<Utc>>,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Job {
    pub fn new(dag: DagSource, tenant_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            dag,
            tenant_id: tenant_id.into(),
            schedule_id: None,
            run_id: None,
            task_class: TaskClass::Bulk,
            priority: None,
            attempts: 0,
            status: JobStatus::Pending,
            lease_until: None,
            enqueued_at: Utc::now(),
            failure_reason: None,
            last_error: None,
        }
    }

    /// Effective idempotency key: the explicit `run_id` if set, else the
    /// job id itself.
    pub fn idempotency_key(&self) -> String {
        self.run_id.clone().unwrap_or_else(|| self.id.to_string())
    }
}

/// A job that exhausted its retries, with the original payload preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub job: Job,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Arbitrary JSON result/error payload attached to a job status update.
pub type JobOutcome = Value;
