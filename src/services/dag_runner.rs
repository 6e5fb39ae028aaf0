//! DAG runner (spec §4.I): executes a validated `Dag` in topological order,
//! pausing at checkpoint tasks and resuming from a written `ResumeToken`.
//! Grounded on `original_source/.../orchestrator/runner.py`'s `run_dag`/
//! `resume_dag`, reshaped per REDESIGN FLAGS: raised `RunnerError` becomes a
//! typed `Result`, the module-level `WORKFLOW_MAP` becomes an injected
//! `WorkflowRegistry`, and retries go through `services::backoff` instead of
//! a bare `for attempt in range(...)` loop.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::models::dag::{merge_payloads, next_task_id, upstream_outputs_for};
use crate::domain::models::{CheckpointStatus, Dag, Task};
use crate::domain::ports::checkpoint_store::CheckpointStore;
use crate::domain::ports::errors::OrchestratorError;
use crate::domain::ports::workflow_registry::WorkflowRegistry;
use crate::services::backoff::{self, BackoffConfig, Fault};
use crate::services::jsonl::append_jsonl_line;

/// One line of the run's event log, mirroring `run_dag`'s `log_event` calls
/// (`dag_start`, `task_start`, `task_ok`, `task_retry`, `task_fail`,
/// `checkpoint_pending`, `dag_done`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub timestamp: chrono::DateTime<Utc>,
    pub event: String,
    pub dag_name: String,
    pub dag_run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks_succeeded: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks_failed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

impl RunEvent {
    fn base(event: &str, dag: &Dag, dag_run_id: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            event: event.to_string(),
            dag_name: dag.name.clone(),
            dag_run_id: dag_run_id.to_string(),
            tenant: None,
            task_id: None,
            workflow_ref: None,
            checkpoint_id: None,
            attempt: None,
            error: None,
            task_count: None,
            tasks_succeeded: None,
            tasks_failed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Paused,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub dag_run_id: String,
    pub checkpoint_id: Option<String>,
    pub task_outputs: HashMap<String, HashMap<String, Value>>,
    pub tasks_succeeded: usize,
    pub tasks_failed: usize,
}

/// Runs DAGs against an injected workflow registry, checkpoint store, and
/// event log path. Holding these as fields (rather than module-level
/// globals or function parameters threaded through every call) is the
/// REDESIGN FLAGS' "injected handles, not singletons" applied to the
/// runner's own dependencies.
pub struct DagRunner {
    registry: Arc<WorkflowRegistry>,
    checkpoints: Arc<dyn CheckpointStore>,
    events_path: PathBuf,
    default_retries: u32,
}

impl DagRunner {
    pub fn new(registry: Arc<WorkflowRegistry>, checkpoints: Arc<dyn CheckpointStore>, events_path: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            checkpoints,
            events_path: events_path.into(),
            default_retries: 0,
        }
    }

    pub fn with_default_retries(mut self, default_retries: u32) -> Self {
        self.default_retries = default_retries;
        self
    }

    async fn log(&self, event: RunEvent) -> Result<(), OrchestratorError> {
        append_jsonl_line(&self.events_path, &event).await
    }

    /// Execute every task from `dag`'s toposorted order, starting fresh.
    pub async fn run_dag(&self, dag: &Dag, tenant: &str) -> Result<RunOutcome, OrchestratorError> {
        dag.validate().map_err(|e| OrchestratorError::validation(format!("DAG validation failed: {e}")))?;
        let dag_run_id = Uuid::new_v4().to_string();
        self.execute_from(dag, tenant, &dag_run_id, None, HashMap::new()).await
    }

    /// Resume a paused run: reads its `ResumeToken`, confirms the matching
    /// checkpoint is approved, seeds `task_outputs` with the checkpoint's
    /// approval data under the checkpoint task's id, and continues
    /// execution from `next_task_id`.
    pub async fn resume_dag(&self, dag: &Dag, dag_run_id: &str, tenant: &str) -> Result<RunOutcome, OrchestratorError> {
        let token = self
            .checkpoints
            .get_resume_token(dag_run_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found(format!("no resume token for DAG run {dag_run_id}")))?;

        let checkpoints = self.checkpoints.list_checkpoints(Some(tenant), None).await?;
        let checkpoint = checkpoints
            .into_iter()
            .find(|cp| cp.dag_run_id == dag_run_id)
            .ok_or_else(|| OrchestratorError::not_found(format!("no checkpoint found for DAG run {dag_run_id}")))?;

        if checkpoint.status != CheckpointStatus::Approved {
            return Err(OrchestratorError::conflict(format!(
                "checkpoint {} is not approved, cannot resume",
                checkpoint.checkpoint_id
            )));
        }

        let mut task_outputs = HashMap::new();
        if let Some(approval_data) = &checkpoint.approval_data {
            task_outputs.insert(checkpoint.task_id.clone(), approval_data.clone());
        }

        let mut event = RunEvent::base("checkpoint_approved", dag, dag_run_id);
        event.checkpoint_id = Some(checkpoint.checkpoint_id.clone());
        self.log(event).await?;

        self.execute_from(dag, tenant, dag_run_id, token.next_task_id.as_deref(), task_outputs).await
    }

    async fn execute_from(
        &self,
        dag: &Dag,
        tenant: &str,
        dag_run_id: &str,
        start_from_task: Option<&str>,
        mut task_outputs: HashMap<String, HashMap<String, Value>>,
    ) -> Result<RunOutcome, OrchestratorError> {
        let ordered = dag.toposort().map_err(|e| OrchestratorError::validation(format!("failed to sort DAG: {e}")))?;

        let start_idx = match start_from_task {
            Some(task_id) => ordered.iter().position(|t| t.id == task_id).unwrap_or(0),
            None => 0,
        };
        let tasks_to_execute = &ordered[start_idx..];

        let mut tasks_succeeded = 0usize;
        let tasks_failed = 0usize;

        if start_from_task.is_none() {
            let mut event = RunEvent::base("dag_start", dag, dag_run_id);
            event.tenant = Some(tenant.to_string());
            event.task_count = Some(ordered.len());
            self.log(event).await?;
        }

        for task in tasks_to_execute {
            if task.is_checkpoint() {
                return self.pause_at_checkpoint(dag, tenant, dag_run_id, task, &ordered, task_outputs, tasks_succeeded).await;
            }

            let mut start_event = RunEvent::base("task_start", dag, dag_run_id);
            start_event.task_id = Some(task.id.clone());
            start_event.workflow_ref = task.workflow_ref.clone();
            self.log(start_event).await?;

            let upstream = upstream_outputs_for(task, &task_outputs);
            let mut merged_params = task.params.clone();
            merged_params.extend(merge_payloads(&upstream));

            let workflow_ref = task
                .workflow_ref
                .as_deref()
                .ok_or_else(|| OrchestratorError::validation(format!("task {} has no workflow_ref", task.id)))?;
            let handler = self
                .registry
                .get(workflow_ref)
                .ok_or_else(|| OrchestratorError::validation(format!("unknown workflow: {workflow_ref}")))?;

            let max_retries = if task.retries > 0 { task.retries } else { self.default_retries };
            let cfg = BackoffConfig {
                max_retries,
                ..BackoffConfig::default()
            };

            let attempt_count = std::sync::atomic::AtomicU32::new(0);
            let output = backoff::retry_with_backoff(
                || {
                    let attempt = attempt_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    let handler = handler.clone();
                    let params = merged_params.clone();
                    let dag = dag.clone();
                    let dag_run_id = dag_run_id.to_string();
                    let task_id = task.id.clone();
                    let events_path = self.events_path.clone();
                    async move {
                        match handler.call(params).await {
                            Ok(out) => Ok(out),
                            Err(err) => {
                                let retry_event = RunEvent {
                                    attempt: Some(attempt + 1),
                                    error: Some(err.to_string()),
                                    task_id: Some(task_id),
                                    ..RunEvent::base("task_retry", &dag, &dag_run_id)
                                };
                                let _ = append_jsonl_line(&events_path, &retry_event).await;
                                Err(err)
                            }
                        }
                    }
                },
                cfg,
                |_| Fault::Transport,
            )
            .await;

            match output {
                Ok(out) => {
                    task_outputs.insert(task.id.clone(), out);
                    let mut ok_event = RunEvent::base("task_ok", dag, dag_run_id);
                    ok_event.task_id = Some(task.id.clone());
                    ok_event.attempt = Some(attempt_count.load(std::sync::atomic::Ordering::SeqCst));
                    self.log(ok_event).await?;
                    tasks_succeeded += 1;
                }
                Err(err) => {
                    let mut fail_event = RunEvent::base("task_fail", dag, dag_run_id);
                    fail_event.task_id = Some(task.id.clone());
                    fail_event.error = Some(err.to_string());
                    self.log(fail_event).await?;
                    return Err(OrchestratorError::fatal(format!(
                        "task '{}' failed after {} attempts: {err}",
                        task.id,
                        max_retries + 1
                    )));
                }
            }
        }

        let mut done_event = RunEvent::base("dag_done", dag, dag_run_id);
        done_event.tenant = Some(tenant.to_string());
        done_event.tasks_succeeded = Some(tasks_succeeded);
        done_event.tasks_failed = Some(tasks_failed);
        self.log(done_event).await?;

        Ok(RunOutcome {
            status: RunStatus::Success,
            dag_run_id: dag_run_id.to_string(),
            checkpoint_id: None,
            task_outputs,
            tasks_succeeded,
            tasks_failed,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn pause_at_checkpoint(
        &self,
        dag: &Dag,
        tenant: &str,
        dag_run_id: &str,
        task: &Task,
        ordered: &[&Task],
        task_outputs: HashMap<String, HashMap<String, Value>>,
        tasks_succeeded: usize,
    ) -> Result<RunOutcome, OrchestratorError> {
        let checkpoint_id = format!("{dag_run_id}_{}", task.id);

        self.checkpoints
            .create_checkpoint(
                &checkpoint_id,
                dag_run_id,
                &task.id,
                tenant,
                task.prompt.as_deref().unwrap_or(&format!("Approve checkpoint {}?", task.id)),
                task.required_role.as_deref(),
                task.inputs_schema.clone(),
                task.required_signers.clone(),
                task.min_signatures,
            )
            .await?;

        let mut event = RunEvent::base("checkpoint_pending", dag, dag_run_id);
        event.task_id = Some(task.id.clone());
        event.checkpoint_id = Some(checkpoint_id.clone());
        self.log(event).await?;

        if let Some(next) = next_task_id(ordered, &task.id) {
            self.checkpoints.write_resume_token(dag_run_id, Some(&next), tenant).await?;
        } else {
            self.checkpoints.write_resume_token(dag_run_id, None, tenant).await?;
        }

        Ok(RunOutcome {
            status: RunStatus::Paused,
            dag_run_id: dag_run_id.to_string(),
            checkpoint_id: Some(checkpoint_id),
            task_outputs,
            tasks_succeeded,
            tasks_failed: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::task::TaskKind;
    use crate::services::checkpoint_store::JsonlCheckpointStore;
    use tempfile::tempdir;

    fn dag_with_checkpoint() -> Dag {
        Dag {
            name: "approval-flow".into(),
            tenant_id: "tenant-a".into(),
            tasks: vec![
                Task {
                    id: "collect".into(),
                    kind: TaskKind::Workflow,
                    workflow_ref: Some("echo".into()),
                    params: HashMap::new(),
                    depends_on: Vec::new(),
                    retries: 0,
                    prompt: None,
                    required_role: None,
                    inputs_schema: HashMap::new(),
                    required_signers: Vec::new(),
                    min_signatures: None,
                },
                Task {
                    id: "approve".into(),
                    kind: TaskKind::Checkpoint,
                    workflow_ref: None,
                    params: HashMap::new(),
                    depends_on: vec!["collect".into()],
                    retries: 0,
                    prompt: Some("Approve deployment?".into()),
                    required_role: Some("Operator".into()),
                    inputs_schema: HashMap::new(),
                    required_signers: Vec::new(),
                    min_signatures: None,
                },
                Task {
                    id: "deploy".into(),
                    kind: TaskKind::Workflow,
                    workflow_ref: Some("echo".into()),
                    params: HashMap::new(),
                    depends_on: vec!["approve".into()],
                    retries: 0,
                    prompt: None,
                    required_role: None,
                    inputs_schema: HashMap::new(),
                    required_signers: Vec::new(),
                    min_signatures: None,
                },
            ],
        }
    }

    fn registry() -> Arc<WorkflowRegistry> {
        let mut registry = WorkflowRegistry::new();
        registry.register(
            "echo",
            Arc::new(|params: HashMap<String, Value>| async move { Ok(params) }),
        );
        Arc::new(registry)
    }

    #[tokio::test]
    async fn pauses_at_checkpoint_and_resumes_after_approval() {
        let dir = tempdir().unwrap();
        let checkpoints: Arc<dyn CheckpointStore> = Arc::new(JsonlCheckpointStore::new(
            dir.path().join("checkpoints.jsonl"),
            dir.path().join("resume_tokens.jsonl"),
            72,
        ));
        let runner = DagRunner::new(registry(), checkpoints.clone(), dir.path().join("events.jsonl"));

        let dag = dag_with_checkpoint();
        let outcome = runner.run_dag(&dag, "tenant-a").await.unwrap();
        assert_eq!(outcome.status, RunStatus::Paused);
        let checkpoint_id = outcome.checkpoint_id.clone().unwrap();

        checkpoints.approve_checkpoint(&checkpoint_id, "alice", HashMap::new()).await.unwrap();

        let resumed = runner.resume_dag(&dag, &outcome.dag_run_id, "tenant-a").await.unwrap();
        assert_eq!(resumed.status, RunStatus::Success);
        assert!(resumed.task_outputs.contains_key("deploy"));
    }

    #[tokio::test]
    async fn resume_without_approval_fails() {
        let dir = tempdir().unwrap();
        let checkpoints: Arc<dyn CheckpointStore> = Arc::new(JsonlCheckpointStore::new(
            dir.path().join("checkpoints.jsonl"),
            dir.path().join("resume_tokens.jsonl"),
            72,
        ));
        let runner = DagRunner::new(registry(), checkpoints, dir.path().join("events.jsonl"));

        let dag = dag_with_checkpoint();
        let outcome = runner.run_dag(&dag, "tenant-a").await.unwrap();

        let err = runner.resume_dag(&dag, &outcome.dag_run_id, "tenant-a").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Conflict { .. }));
    }
}
