//! Persistent job queue port (spec §4.D).

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::models::{Job, JobStatus};
use crate::domain::ports::errors::OrchestratorError;

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> Result<Uuid, OrchestratorError>;

    /// Pop the next job and make it invisible to other callers for
    /// `visibility_ms`. Returns `None` if the queue is empty.
    async fn dequeue(&self, visibility_ms: u64) -> Result<Option<Job>, OrchestratorError>;

    async fn extend_visibility(&self, job_id: Uuid, ms: u64) -> Result<(), OrchestratorError>;

    async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<(), OrchestratorError>;

    async fn move_to_dlq(&self, job_id: Uuid, reason: &str) -> Result<(), OrchestratorError>;

    async fn dlq_entries(&self) -> Result<Vec<crate::domain::models::DeadLetter>, OrchestratorError>;

    async fn depth(&self) -> Result<usize, OrchestratorError>;
}
