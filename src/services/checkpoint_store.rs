//! Checkpoint store (spec §4.G): append-only JSONL log of checkpoint
//! transitions, last-record-per-id-wins view. Grounded directly on
//! `original_source/.../orchestrator/checkpoints.py` (`create_checkpoint`,
//! `approve_checkpoint`, `reject_checkpoint`, `add_signature`,
//! `expire_pending`, `write_resume_token`/`get_resume_token`), reimplemented
//! with typed `Result`s instead of raised exceptions per the REDESIGN FLAGS.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::domain::models::{Approval, Checkpoint, CheckpointStatus, ResumeToken};
use crate::domain::ports::checkpoint_store::CheckpointStore;
use crate::domain::ports::errors::OrchestratorError;
use crate::services::jsonl::{append_jsonl_line, read_jsonl_lines};

/// One line of the checkpoint log. `checkpoint` carries the full
/// current-state snapshot after the transition named by `event`; the
/// reader rebuilds the latest view per `checkpoint_id` by keeping the last
/// record seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointRecord {
    event: String,
    checkpoint: Checkpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResumeTokenRecord {
    event: String,
    token: ResumeToken,
}

/// JSONL-backed checkpoint store. Writes are serialized through a single
/// `tokio::sync::Mutex` so transitions on different checkpoints still see a
/// consistent, line-atomic log, matching the single-writer discipline spec
/// §5 requires.
pub struct JsonlCheckpointStore {
    log_path: PathBuf,
    token_path: PathBuf,
    write_lock: Mutex<()>,
    expiry: Duration,
}

impl JsonlCheckpointStore {
    pub fn new(log_path: impl Into<PathBuf>, token_path: impl Into<PathBuf>, expiry_hours: i64) -> Self {
        Self {
            log_path: log_path.into(),
            token_path: token_path.into(),
            write_lock: Mutex::new(()),
            expiry: Duration::hours(expiry_hours),
        }
    }

    async fn latest_by_id(&self) -> Result<HashMap<String, Checkpoint>, OrchestratorError> {
        let records: Vec<CheckpointRecord> = read_jsonl_lines(&self.log_path).await?;
        let mut latest = HashMap::new();
        for record in records {
            latest.insert(record.checkpoint.checkpoint_id.clone(), record.checkpoint);
        }
        Ok(latest)
    }

    async fn append(&self, event: &str, checkpoint: &Checkpoint) -> Result<(), OrchestratorError> {
        append_jsonl_line(
            &self.log_path,
            &CheckpointRecord {
                event: event.to_string(),
                checkpoint: checkpoint.clone(),
            },
        )
        .await
    }
}

#[async_trait]
impl CheckpointStore for JsonlCheckpointStore {
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
    ) -> Result<Checkpoint, OrchestratorError> {
        let _guard = self.write_lock.lock().await;

        let now = Utc::now();
        let checkpoint = Checkpoint {
            checkpoint_id: checkpoint_id.to_string(),
            dag_run_id: dag_run_id.to_string(),
            task_id: task_id.to_string(),
            tenant: tenant.to_string(),
            prompt: prompt.to_string(),
            required_role: required_role.unwrap_or("Admin").to_string(),
            required_signers,
            min_signatures: min_signatures.unwrap_or(1),
            inputs_schema,
            status: CheckpointStatus::Pending,
            approvals: Vec::new(),
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejection_reason: None,
            approval_data: None,
            created_at: now,
            expires_at: now + self.expiry,
        };

        self.append("checkpoint_created", &checkpoint).await?;
        Ok(checkpoint)
    }

    async fn get_checkpoint(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>, OrchestratorError> {
        Ok(self.latest_by_id().await?.remove(checkpoint_id))
    }

    async fn list_checkpoints(
        &self,
        tenant: Option<&str>,
        status: Option<CheckpointStatus>,
    ) -> Result<Vec<Checkpoint>, OrchestratorError> {
        let latest = self.latest_by_id().await?;
        let mut checkpoints: Vec<Checkpoint> = latest
            .into_values()
            .filter(|cp| tenant.is_none_or(|t| cp.tenant == t))
            .filter(|cp| status.is_none_or(|s| cp.status == s))
            .collect();
        checkpoints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(checkpoints)
    }

    async fn approve_checkpoint(
        &self,
        checkpoint_id: &str,
        approved_by: &str,
        approval_data: HashMap<String, Value>,
    ) -> Result<Checkpoint, OrchestratorError> {
        let _guard = self.write_lock.lock().await;

        let mut checkpoint = self
            .latest_by_id()
            .await?
            .remove(checkpoint_id)
            .ok_or_else(|| OrchestratorError::not_found(format!("checkpoint {checkpoint_id} not found")))?;

        let now = Utc::now();
        if checkpoint.is_expired(now) {
            return Err(OrchestratorError::expired(format!("checkpoint {checkpoint_id} has expired")));
        }
        if checkpoint.status != CheckpointStatus::Pending {
            return Err(OrchestratorError::conflict(format!(
                "checkpoint {checkpoint_id} is not pending (status={:?})",
                checkpoint.status
            )));
        }

        checkpoint.status = CheckpointStatus::Approved;
        checkpoint.approved_by = Some(approved_by.to_string());
        checkpoint.approved_at = Some(now);
        checkpoint.approval_data = Some(approval_data);

        self.append("checkpoint_approved", &checkpoint).await?;
        Ok(checkpoint)
    }

    async fn reject_checkpoint(
        &self,
        checkpoint_id: &str,
        rejected_by: &str,
        reason: &str,
    ) -> Result<Checkpoint, OrchestratorError> {
        let _guard = self.write_lock.lock().await;

        let mut checkpoint = self
            .latest_by_id()
            .await?
            .remove(checkpoint_id)
            .ok_or_else(|| OrchestratorError::not_found(format!("checkpoint {checkpoint_id} not found")))?;

        let now = Utc::now();
        if checkpoint.is_expired(now) {
            return Err(OrchestratorError::expired(format!("checkpoint {checkpoint_id} has expired")));
        }
        if checkpoint.status != CheckpointStatus::Pending {
            return Err(OrchestratorError::conflict(format!(
                "checkpoint {checkpoint_id} is not pending (status={:?})",
                checkpoint.status
            )));
        }

        checkpoint.status = CheckpointStatus::Rejected;
        checkpoint.rejected_by = Some(rejected_by.to_string());
        checkpoint.rejection_reason = Some(reason.to_string());

        self.append("checkpoint_rejected", &checkpoint).await?;
        Ok(checkpoint)
    }

    async fn add_signature(
        &self,
        checkpoint_id: &str,
        user: &str,
        data: HashMap<String, Value>,
    ) -> Result<Checkpoint, OrchestratorError> {
        let _guard = self.write_lock.lock().await;

        let mut checkpoint = self
            .latest_by_id()
            .await?
            .remove(checkpoint_id)
            .ok_or_else(|| OrchestratorError::not_found(format!("checkpoint {checkpoint_id} not found")))?;

        let now = Utc::now();
        if checkpoint.is_expired(now) {
            return Err(OrchestratorError::expired(format!("checkpoint {checkpoint_id} has expired")));
        }
        if checkpoint.status != CheckpointStatus::Pending {
            return Err(OrchestratorError::conflict(format!(
                "checkpoint {checkpoint_id} is not pending (status={:?})",
                checkpoint.status
            )));
        }
        if checkpoint.has_signed(user) {
            return Err(OrchestratorError::conflict(format!("{user} has already signed {checkpoint_id}")));
        }

        checkpoint.approvals.push(Approval { user: user.to_string(), at: now, data });

        self.append("signature_added", &checkpoint).await?;
        Ok(checkpoint)
    }

    async fn expire_pending(&self, now: DateTime<Utc>) -> Result<Vec<Checkpoint>, OrchestratorError> {
        let _guard = self.write_lock.lock().await;

        let pending: Vec<Checkpoint> = self
            .latest_by_id()
            .await?
            .into_values()
            .filter(|cp| cp.status == CheckpointStatus::Pending && now >= cp.expires_at)
            .collect();

        let mut expired = Vec::with_capacity(pending.len());
        for mut checkpoint in pending {
            checkpoint.status = CheckpointStatus::Expired;
            self.append("checkpoint_expired", &checkpoint).await?;
            expired.push(checkpoint);
        }
        Ok(expired)
    }

    async fn write_resume_token(&self, dag_run_id: &str, next_task_id: Option<&str>, tenant: &str) -> Result<(), OrchestratorError> {
        let token = ResumeToken {
            dag_run_id: dag_run_id.to_string(),
            next_task_id: next_task_id.map(str::to_string),
            tenant: tenant.to_string(),
            ts: Utc::now(),
        };
        append_jsonl_line(&self.token_path, &ResumeTokenRecord { event: "resume_token".to_string(), token }).await
    }

    async fn get_resume_token(&self, dag_run_id: &str) -> Result<Option<ResumeToken>, OrchestratorError> {
        let records: Vec<ResumeTokenRecord> = read_jsonl_lines(&self.token_path).await?;
        Ok(records.into_iter().filter(|r| r.token.dag_run_id == dag_run_id).last().map(|r| r.token))
    }
}
