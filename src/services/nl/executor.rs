//! NL plan executor (spec §4.N): runs a `Plan`'s steps through the action
//! router, pausing high-risk plans behind a checkpoint instead of
//! executing them outright. Grounded on `original_source/.../nl/
//! executor.py`'s `execute_plan`/`resume_plan`/`get_execution_history`:
//! dry-run returns a preview only, approval-gated plans create a
//! checkpoint and return paused, execution stops at the first failing
//! step, and every attempt is audited regardless of outcome.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::models::Plan;
use crate::domain::ports::action_router::Role;
use crate::domain::ports::checkpoint_store::CheckpointStore;
use crate::domain::ports::errors::OrchestratorError;
use crate::services::action_router::ActionRouter;
use crate::services::audit_log::{AuditFilter, AuditLog};

/// Role a checkpoint requires to approve an NL plan, absent a per-tenant
/// override (`NL_APPROVER_ROLE` in config).
pub const DEFAULT_APPROVER_ROLE: &str = "operator";

/// Outcome of one plan step, recorded in `ExecutionResult::step_results`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub action: String,
    pub graph_id: String,
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    DryRun,
    Paused,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub plan_id: String,
    pub status: ExecutionStatus,
    pub preview: Option<String>,
    pub checkpoint_id: Option<String>,
    pub step_results: Vec<StepResult>,
}

fn checkpoint_id_for(plan_id: &str) -> String {
    format!("nlp-approval-{plan_id}")
}

/// Executes NL plans built by `planner::build_plan`. Holds the same three
/// collaborators `execute_action`/`create_checkpoint` reached for at
/// module scope in the original: routing, approvals, and audit.
pub struct PlanExecutor {
    router: Arc<ActionRouter>,
    checkpoints: Arc<dyn CheckpointStore>,
    audit: Arc<AuditLog>,
    approver_role: String,
    approval_ttl_hours: i64,
}

impl PlanExecutor {
    pub fn new(router: Arc<ActionRouter>, checkpoints: Arc<dyn CheckpointStore>, audit: Arc<AuditLog>) -> Self {
        Self {
            router,
            checkpoints,
            audit,
            approver_role: DEFAULT_APPROVER_ROLE.to_string(),
            approval_ttl_hours: 48,
        }
    }

    pub fn with_approver_role(mut self, role: impl Into<String>) -> Self {
        self.approver_role = role.into();
        self
    }

    /// Execute `plan` on behalf of `user` in `tenant`. `dry_run` short
    /// circuits to a preview before any checkpoint or action runs, so a
    /// caller can show what would happen without side effects or pausing.
    pub async fn execute_plan(&self, plan: &Plan, tenant: &str, user: &str, dry_run: bool) -> Result<ExecutionResult, OrchestratorError> {
        self.audit.log_success(tenant, user, "nl.plan.execute", "plan", &plan.plan_id)?;

        if dry_run {
            return Ok(ExecutionResult {
                plan_id: plan.plan_id.clone(),
                status: ExecutionStatus::DryRun,
                preview: Some(plan.preview.clone()),
                checkpoint_id: None,
                step_results: Vec::new(),
            });
        }

        if plan.requires_approval {
            let checkpoint_id = checkpoint_id_for(&plan.plan_id);
            let mut inputs_schema = HashMap::new();
            inputs_schema.insert(
                "plan".to_string(),
                serde_json::to_value(plan).map_err(|e| OrchestratorError::fatal(format!("serializing plan: {e}")))?,
            );

            self.checkpoints
                .create_checkpoint(
                    &checkpoint_id,
                    &plan.plan_id,
                    "nl-plan",
                    tenant,
                    &plan.preview,
                    Some(&self.approver_role),
                    inputs_schema,
                    Vec::new(),
                    None,
                )
                .await?;

            return Ok(ExecutionResult {
                plan_id: plan.plan_id.clone(),
                status: ExecutionStatus::Paused,
                preview: Some(plan.preview.clone()),
                checkpoint_id: Some(checkpoint_id),
                step_results: Vec::new(),
            });
        }

        self.run_steps(plan, tenant, user).await
    }

    /// Resume a paused plan after its checkpoint was approved. Fails if
    /// the checkpoint is missing or not yet `Approved` — a rejected or
    /// still-pending checkpoint cannot be resumed.
    pub async fn resume_plan(&self, checkpoint_id: &str, tenant: &str, user: &str) -> Result<ExecutionResult, OrchestratorError> {
        let checkpoint = self
            .checkpoints
            .get_checkpoint(checkpoint_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found(format!("checkpoint not found: {checkpoint_id}")))?;

        if checkpoint.tenant != tenant {
            return Err(OrchestratorError::unauthorized(format!("checkpoint {checkpoint_id} belongs to a different tenant")));
        }

        if checkpoint.status != crate::domain::models::CheckpointStatus::Approved {
            return Err(OrchestratorError::conflict(format!(
                "checkpoint {checkpoint_id} is {:?}, not approved",
                checkpoint.status
            )));
        }

        let plan_value = checkpoint
            .inputs_schema
            .get("plan")
            .ok_or_else(|| OrchestratorError::fatal(format!("checkpoint {checkpoint_id} has no stored plan")))?;
        let plan: Plan = serde_json::from_value(plan_value.clone()).map_err(|e| OrchestratorError::fatal(format!("deserializing stored plan: {e}")))?;

        self.audit.log_success(tenant, user, "nl.plan.resume", "plan", &plan.plan_id)?;
        self.run_steps(&plan, tenant, user).await
    }

    async fn run_steps(&self, plan: &Plan, tenant: &str, user: &str) -> Result<ExecutionResult, OrchestratorError> {
        let mut step_results = Vec::new();
        let mut status = ExecutionStatus::Success;

        for step in &plan.steps {
            match self
                .router
                .execute(&step.action, &step.graph_id, step.payload.clone(), user, Role::Operator, tenant)
                .await
            {
                Ok(output) => step_results.push(StepResult {
                    action: step.action.clone(),
                    graph_id: step.graph_id.clone(),
                    success: true,
                    output: Some(output),
                    error: None,
                }),
                Err(err) => {
                    step_results.push(StepResult {
                        action: step.action.clone(),
                        graph_id: step.graph_id.clone(),
                        success: false,
                        output: None,
                        error: Some(err.to_string()),
                    });
                    status = ExecutionStatus::Error;
                    break;
                }
            }
        }

        Ok(ExecutionResult {
            plan_id: plan.plan_id.clone(),
            status,
            preview: None,
            checkpoint_id: None,
            step_results,
        })
    }

    /// History of NL plan execute/resume attempts for `tenant`, newest
    /// first, drawn from the audit log rather than a dedicated store.
    pub fn get_execution_history(&self, tenant: &str, limit: usize) -> Result<Vec<crate::domain::models::AuditEvent>, OrchestratorError> {
        let mut events = self.audit.query(&AuditFilter {
            tenant: Some(tenant.to_string()),
            action: None,
            actor: None,
            result: None,
            start_date: None,
            end_date: None,
            limit: 0,
        })?;
        events.retain(|e| e.action.starts_with("nl.plan."));
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if limit > 0 {
            events.truncate(limit);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{PlanStep, RiskLevel};
    use crate::domain::ports::action_router::{ActionHandler, ActionRegistry};
    use crate::domain::models::Resource;
    use crate::services::checkpoint_store::JsonlCheckpointStore;
    use crate::services::urg_index::UrgIndex;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct EchoHandler;

    #[async_trait]
    impl ActionHandler for EchoHandler {
        async fn execute(&self, resource: &Resource, _payload: HashMap<String, Value>, _user: &str, _tenant: &str) -> Result<Value, OrchestratorError> {
            Ok(Value::String(resource.id.clone()))
        }
        fn required_role(&self) -> Role {
            Role::Operator
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl ActionHandler for FailingHandler {
        async fn execute(&self, _resource: &Resource, _payload: HashMap<String, Value>, _user: &str, _tenant: &str) -> Result<Value, OrchestratorError> {
            Err(OrchestratorError::retryable("downstream unavailable"))
        }
        fn required_role(&self) -> Role {
            Role::Operator
        }
    }

    async fn executor(dir: &std::path::Path, failing: bool) -> (PlanExecutor, String) {
        let urg = Arc::new(UrgIndex::new(dir.join("urg")));
        let resource = Resource {
            id: "r1".to_string(),
            resource_type: "message".to_string(),
            source: "gmail".to_string(),
            tenant: "tenant-a".to_string(),
            title: "hi".to_string(),
            snippet: String::new(),
            timestamp: Utc::now(),
            participants: Vec::new(),
            labels: Vec::new(),
            thread_id: None,
            channel_id: None,
            metadata: HashMap::new(),
        };
        let graph_id = urg.upsert(resource).await.unwrap();

        let mut registry = ActionRegistry::new();
        if failing {
            registry.register("message", "send", Arc::new(FailingHandler));
        } else {
            registry.register("message", "send", Arc::new(EchoHandler));
        }

        let audit = Arc::new(AuditLog::new(dir.join("audit")).unwrap());
        let router = Arc::new(ActionRouter::new(registry, urg, audit.clone()));
        let checkpoints = Arc::new(JsonlCheckpointStore::new(dir.join("checkpoints.jsonl"), dir.join("resume.jsonl"), 48));
        (PlanExecutor::new(router, checkpoints, audit), graph_id)
    }

    fn plan(plan_id: &str, graph_id: &str, risk_level: RiskLevel, requires_approval: bool) -> Plan {
        let steps = vec![PlanStep {
            action: "message.send".to_string(),
            graph_id: graph_id.to_string(),
            payload: HashMap::new(),
            description: "send".to_string(),
        }];
        Plan {
            plan_id: plan_id.to_string(),
            intent: "message alice".to_string(),
            preview: Plan::render_preview("message alice", &steps),
            steps,
            risk_level,
            requires_approval,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn dry_run_returns_preview_without_executing() {
        let dir = tempdir().unwrap();
        let (executor, graph_id) = executor(dir.path(), false).await;
        let plan = plan("p1", &graph_id, RiskLevel::Medium, false);

        let result = executor.execute_plan(&plan, "tenant-a", "bob", true).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::DryRun);
        assert!(result.preview.is_some());
        assert!(result.step_results.is_empty());
    }

    #[tokio::test]
    async fn high_risk_plan_pauses_behind_a_checkpoint() {
        let dir = tempdir().unwrap();
        let (executor, graph_id) = executor(dir.path(), false).await;
        let plan = plan("p2", &graph_id, RiskLevel::High, true);

        let result = executor.execute_plan(&plan, "tenant-a", "bob", false).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Paused);
        assert_eq!(result.checkpoint_id.as_deref(), Some("nlp-approval-p2"));
    }

    #[tokio::test]
    async fn low_risk_plan_executes_immediately() {
        let dir = tempdir().unwrap();
        let (executor, graph_id) = executor(dir.path(), false).await;
        let plan = plan("p3", &graph_id, RiskLevel::Medium, false);

        let result = executor.execute_plan(&plan, "tenant-a", "bob", false).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.step_results.len(), 1);
        assert!(result.step_results[0].success);
    }

    #[tokio::test]
    async fn step_failure_stops_execution_and_marks_error() {
        let dir = tempdir().unwrap();
        let (executor, graph_id) = executor(dir.path(), true).await;
        let plan = plan("p4", &graph_id, RiskLevel::Medium, false);

        let result = executor.execute_plan(&plan, "tenant-a", "bob", false).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(result.step_results.len(), 1);
        assert!(!result.step_results[0].success);
    }

    #[tokio::test]
    async fn resume_requires_an_approved_checkpoint() {
        let dir = tempdir().unwrap();
        let (executor, graph_id) = executor(dir.path(), false).await;
        let plan = plan("p5", &graph_id, RiskLevel::High, true);

        let paused = executor.execute_plan(&plan, "tenant-a", "bob", false).await.unwrap();
        let checkpoint_id = paused.checkpoint_id.unwrap();

        let err = executor.resume_plan(&checkpoint_id, "tenant-a", "carol").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Conflict { .. }));

        executor.checkpoints.approve_checkpoint(&checkpoint_id, "carol", HashMap::new()).await.unwrap();
        let result = executor.resume_plan(&checkpoint_id, "tenant-a", "carol").await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn execution_history_only_includes_nl_plan_events() {
        let dir = tempdir().unwrap();
        let (executor, graph_id) = executor(dir.path(), false).await;
        let plan = plan("p6", &graph_id, RiskLevel::Medium, false);
        executor.execute_plan(&plan, "tenant-a", "bob", false).await.unwrap();

        let history = executor.get_execution_history("tenant-a", 10).unwrap();
        assert!(!history.is_empty());
        assert!(history.iter().all(|e| e.action.starts_with("nl.plan.")));
    }
}
