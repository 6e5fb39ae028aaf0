//! Checkpoint store port (spec §4.G).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

use crate::domain::models::Checkpoint;
use crate::domain::ports::errors::OrchestratorError;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn create_checkpoint(
        &self,
        checkpoint_id: &str,
        dag_run_id: &str,
        task_id: &str,
        tenant: &str,
        prompt: &str,
        required_role: Option<&str>,
        inputs_schema: HashMap<String, Value>,
        required_signers: Vec<String>,
        min_signatures: Option<u32>,
    ) -> Result<Checkpoint, OrchestratorError>;

    async fn get_checkpoint(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>, OrchestratorError>;

    async fn list_checkpoints(
        &self,
        tenant: Option<&str>,
        status: Option<crate::domain::models::CheckpointStatus>,
    ) -> Result<Vec<Checkpoint>, OrchestratorError>;

    async fn approve_checkpoint(
        &self,
        checkpoint_id: &str,
        approved_by: &str,
        approval_data: HashMap<String, Value>,
    ) -> Result<Checkpoint, OrchestratorError>;

    async fn reject_checkpoint(
        &self,
        checkpoint_id: &str,
        rejected_by: &str,
        reason: &str,
    ) -> Result<Checkpoint, OrchestratorError>;

    async fn add_signature(
        &self,
        checkpoint_id: &str,
        user: &str,
        data: HashMap<String, Value>,
    ) -> Result<Checkpoint, OrchestratorError>;

    /// Transition every pending checkpoint with `expires_at <= now` to
    /// `expired`, returning the ones that were transitioned. Idempotent:
    /// a second call with the same `now` returns an empty list.
    async fn expire_pending(&self, now: DateTime<Utc>) -> Result<Vec<Checkpoint>, OrchestratorError>;

    async fn write_resume_token(
        &self,
        dag_run_id: &str,
        next_task_id: Option<&str>,
        tenant: &str,
    ) -> Result<(), OrchestratorError>;

    async fn get_resume_token(
        &self,
        dag_run_id: &str,
    ) -> Result<Option<crate::domain::models::ResumeToken>, OrchestratorError>;
}
