//! Integration tests for the six literal end-to-end scenarios spec §8
//! names, driven entirely through this crate's public API against
//! `tempfile`-rooted JSONL stores (mirroring the teacher's own
//! `tests/integration` use of per-test temporary state).

use orchestrator_core::domain::models::*;
use orchestrator_core::domain::ports::action_router::{ActionHandler, ActionRegistry, Role};
use orchestrator_core::domain::ports::checkpoint_store::CheckpointStore;
use orchestrator_core::domain::ports::errors::OrchestratorError;
use orchestrator_core::domain::ports::queue::JobQueue;
use orchestrator_core::domain::ports::workflow_registry::WorkflowRegistry;
use orchestrator_core::services::action_router::ActionRouter;
use orchestrator_core::services::audit_log::AuditLog;
use orchestrator_core::services::backoff::BackoffConfig;
use orchestrator_core::services::checkpoint_store::JsonlCheckpointStore;
use orchestrator_core::services::dag_runner::{DagRunner, RunStatus};
use orchestrator_core::services::idempotency::DurableIdempotencyTracker;
use orchestrator_core::services::nl::{build_plan, parse_intent, ExecutionStatus, PlanExecutor};
use orchestrator_core::services::queue::InMemoryJobQueue;
use orchestrator_core::services::rate_limiter::{BucketConfig, RateLimiter};
use orchestrator_core::services::urg_index::UrgIndex;
use orchestrator_core::services::worker_loop::{run_worker, WorkerConfig, WorkerDeps};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use nonzero_ext::nonzero;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn workflow_task(id: &str, depends_on: &[&str]) -> Task {
    Task {
        id: id.to_string(),
        kind: TaskKind::Workflow,
        workflow_ref: Some("echo".to_string()),
        params: HashMap::new(),
        depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        retries: 0,
        prompt: None,
        required_role: None,
        inputs_schema: HashMap::new(),
        required_signers: Vec::new(),
        min_signatures: None,
    }
}

fn checkpoint_task(id: &str, depends_on: &[&str]) -> Task {
    Task {
        id: id.to_string(),
        kind: TaskKind::Checkpoint,
        workflow_ref: None,
        params: HashMap::new(),
        depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        retries: 0,
        prompt: Some("approve?".to_string()),
        required_role: Some("operator".to_string()),
        inputs_schema: HashMap::new(),
        required_signers: Vec::new(),
        min_signatures: None,
    }
}

fn echo_registry() -> Arc<WorkflowRegistry> {
    let mut registry = WorkflowRegistry::new();
    registry.register("echo", Arc::new(|params: HashMap<String, Value>| async move { Ok(params) }));
    Arc::new(registry)
}

/// Scenario 1: pause/resume. `[A(workflow), C(checkpoint), B(workflow
/// dep=C)]`: run pauses at `C`, approving then resuming reaches success
/// with `task_outputs[C]` set to the approval data.
#[tokio::test]
async fn pause_resume_reaches_success_with_approval_data() {
    let dir = tempdir().unwrap();
    let checkpoints: Arc<dyn CheckpointStore> = Arc::new(JsonlCheckpointStore::new(
        dir.path().join("checkpoints.jsonl"),
        dir.path().join("resume.jsonl"),
        72,
    ));
    let runner = DagRunner::new(echo_registry(), checkpoints.clone(), dir.path().join("events.jsonl"));

    let dag = Dag {
        name: "djp".to_string(),
        tenant_id: "tenant-a".to_string(),
        tasks: vec![workflow_task("A", &[]), checkpoint_task("C", &["A"]), workflow_task("B", &["C"])],
    };

    let outcome = runner.run_dag(&dag, "tenant-a").await.unwrap();
    assert_eq!(outcome.status, RunStatus::Paused);
    let checkpoint_id = outcome.checkpoint_id.clone().unwrap();
    assert_eq!(checkpoint_id, format!("{}_C", outcome.dag_run_id));

    checkpoints
        .approve_checkpoint(&checkpoint_id, "alice", HashMap::from([("signoff".to_string(), json!("ok"))]))
        .await
        .unwrap();

    let resumed = runner.resume_dag(&dag, &outcome.dag_run_id, "tenant-a").await.unwrap();
    assert_eq!(resumed.status, RunStatus::Success);
    assert_eq!(resumed.task_outputs["C"]["signoff"], json!("ok"));
}

/// Scenario 2: retry then DLQ. A job whose handler always fails, with
/// `max_retries = 4`, is retried twice before landing in the DLQ with
/// `reason = "max_retries"` (the worker's `attempts + 1 >= max_retries`
/// check counts the lease-acquiring dequeue itself as one attempt).
#[tokio::test]
async fn retrying_job_lands_in_dlq_after_max_retries() {
    let dir = tempdir().unwrap();
    let mut registry = WorkflowRegistry::new();
    registry.register("boom", Arc::new(|_params: HashMap<String, Value>| async move {
        Err(OrchestratorError::retryable("handler always fails"))
    }));

    let checkpoints: Arc<dyn CheckpointStore> =
        Arc::new(JsonlCheckpointStore::new(dir.path().join("checkpoints.jsonl"), dir.path().join("resume.jsonl"), 72));
    let runner = Arc::new(DagRunner::new(Arc::new(registry), checkpoints, dir.path().join("events.jsonl")));
    let idempotency = Arc::new(DurableIdempotencyTracker::load(dir.path().join("idempotency.jsonl")).await.unwrap());
    let rate_limiter = Arc::new(RateLimiter::new(
        BucketConfig { capacity: nonzero!(1000u32), refill_per_second: nonzero!(1000u32) },
        BucketConfig { capacity: nonzero!(1000u32), refill_per_second: nonzero!(1000u32) },
    ));
    let queue = Arc::new(InMemoryJobQueue::new());

    let deps = Arc::new(WorkerDeps {
        queue: queue.clone(),
        runner,
        idempotency,
        rate_limiter,
        events_path: dir.path().join("worker_events.jsonl"),
        in_flight: Arc::new(AtomicUsize::new(0)),
        config: WorkerConfig {
            poll_ms: 10,
            visibility_ms: 5_000,
            heartbeat_ms: 50_000,
            max_retries: 4,
            rate_limit_retry_delay_ms: 1,
            backoff: BackoffConfig { base_ms: 1, cap_ms: 2, jitter_pct: 0.0, max_retries: 4, max_total_time: Duration::from_secs(5) },
        },
    });

    let dag = Dag {
        name: "always-fails".to_string(),
        tenant_id: "tenant-a".to_string(),
        tasks: vec![Task {
            id: "only".to_string(),
            kind: TaskKind::Workflow,
            workflow_ref: Some("boom".to_string()),
            params: HashMap::new(),
            depends_on: Vec::new(),
            retries: 0,
            prompt: None,
            required_role: None,
            inputs_schema: HashMap::new(),
            required_signers: Vec::new(),
            min_signatures: None,
        }],
    };
    queue.enqueue(Job::new(DagSource::Inline(dag), "tenant-a")).await.unwrap();

    let token = CancellationToken::new();
    let worker_token = token.clone();
    let handle = tokio::spawn(async move { run_worker(deps, "w1", worker_token).await });

    // max_retries=2 with near-zero backoff converges quickly; poll for the
    // DLQ to fill rather than sleeping a fixed guess.
    let mut dlq = Vec::new();
    for _ in 0..200 {
        dlq = queue.dlq_entries().await.unwrap();
        if !dlq.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    token.cancel();
    let _ = handle.await;

    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].reason, "max_retries");
}

/// Scenario 3: tenant isolation. A resource upserted under tenant `A` is
/// invisible to tenant `B` through every read path, and its shard file
/// lives only under `A`'s directory.
#[tokio::test]
async fn tenant_isolation_holds_across_get_search_and_shards() {
    let dir = tempdir().unwrap();
    let index = UrgIndex::new(dir.path());

    let resource = Resource {
        id: "m1".to_string(),
        resource_type: "message".to_string(),
        source: "gmail".to_string(),
        tenant: "tenant-a".to_string(),
        title: "Quarterly numbers".to_string(),
        snippet: String::new(),
        timestamp: Utc::now(),
        participants: Vec::new(),
        labels: Vec::new(),
        thread_id: None,
        channel_id: None,
        metadata: HashMap::new(),
    };
    let id = index.upsert(resource).await.unwrap();

    assert!(index.get(&id, "tenant-a").is_some());
    assert!(index.get(&id, "tenant-b").is_none());
    assert!(index.search("tenant-b", "quarterly", 10).is_empty());

    let today = Utc::now().date_naive();
    assert!(dir.path().join("tenant-a").join(format!("{today}.jsonl")).exists());
    assert!(!dir.path().join("tenant-b").exists());
}

/// Scenario 4: multi-sign. `required_signers=[alice,bob,charlie]`,
/// `min_signatures=2`: a duplicate signature from the same signer is
/// rejected, the second distinct signer satisfies the checkpoint, and
/// approval then succeeds.
#[tokio::test]
async fn multi_sign_checkpoint_requires_distinct_signers() {
    let dir = tempdir().unwrap();
    let store = JsonlCheckpointStore::new(dir.path().join("checkpoints.jsonl"), dir.path().join("resume.jsonl"), 72);

    store
        .create_checkpoint(
            "cp1",
            "run1",
            "C",
            "tenant-a",
            "approve deploy",
            None,
            HashMap::new(),
            vec!["alice".to_string(), "bob".to_string(), "charlie".to_string()],
            Some(2),
        )
        .await
        .unwrap();

    store.add_signature("cp1", "alice", HashMap::new()).await.unwrap();
    let dup = store.add_signature("cp1", "alice", HashMap::new()).await.unwrap_err();
    assert!(matches!(dup, OrchestratorError::Conflict { .. }));

    let satisfied = store.add_signature("cp1", "bob", HashMap::new()).await.unwrap();
    assert!(satisfied.is_satisfied());

    let approved = store.approve_checkpoint("cp1", "bob", HashMap::new()).await.unwrap();
    assert_eq!(approved.status, CheckpointStatus::Approved);
}

/// Scenario 5: expiration sweep. A checkpoint already past its
/// `expires_at` is swept to `expired` exactly once.
#[tokio::test]
async fn expire_pending_sweeps_once_and_is_idempotent() {
    let dir = tempdir().unwrap();
    let store = JsonlCheckpointStore::new(dir.path().join("checkpoints.jsonl"), dir.path().join("resume.jsonl"), 0);

    store
        .create_checkpoint("cp1", "run1", "C", "tenant-a", "approve", None, HashMap::new(), Vec::new(), None)
        .await
        .unwrap();

    let now = Utc::now() + ChronoDuration::hours(1);
    let expired = store.expire_pending(now).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].checkpoint_id, "cp1");

    let second = store.expire_pending(now).await.unwrap();
    assert!(second.is_empty());

    let pending = store.list_checkpoints(Some("tenant-a"), Some(CheckpointStatus::Pending)).await.unwrap();
    assert!(pending.is_empty());
    let now_expired = store.list_checkpoints(Some("tenant-a"), Some(CheckpointStatus::Expired)).await.unwrap();
    assert_eq!(now_expired.len(), 1);
}

struct NeverCalledHandler;

#[async_trait]
impl ActionHandler for NeverCalledHandler {
    async fn execute(&self, _resource: &Resource, _payload: HashMap<String, Value>, _user: &str, _tenant: &str) -> Result<Value, OrchestratorError> {
        panic!("a high-risk plan must never reach the connector before approval");
    }

    fn required_role(&self) -> Role {
        Role::Operator
    }
}

/// Scenario 6: NL plan (high risk). "delete all messages from Alice
/// yesterday in Outlook" parses to a delete verb with a time/source
/// constraint, plans as high risk requiring approval, and pauses behind a
/// checkpoint without ever invoking the registered handler.
#[tokio::test]
async fn high_risk_nl_command_pauses_before_touching_the_connector() {
    let dir = tempdir().unwrap();
    let urg = Arc::new(UrgIndex::new(dir.path().join("urg")));
    urg.upsert(Resource {
        id: "m1".to_string(),
        resource_type: "message".to_string(),
        source: "outlook".to_string(),
        tenant: "tenant-a".to_string(),
        title: "Status update".to_string(),
        snippet: String::new(),
        timestamp: Utc::now(),
        participants: vec!["Alice".to_string()],
        labels: Vec::new(),
        thread_id: None,
        channel_id: None,
        metadata: HashMap::new(),
    })
    .await
    .unwrap();

    let intent = parse_intent("delete all messages from Alice yesterday in Outlook");
    assert_eq!(intent.verb, "delete");
    assert_eq!(intent.targets, vec!["Alice".to_string()]);
    assert_eq!(intent.constraints.get("source").map(String::as_str), Some("outlook"));
    assert_eq!(intent.constraints.get("time").map(String::as_str), Some("yesterday"));

    let plan = build_plan(&urg, "tenant-a", &intent, "p-high-risk");
    assert_eq!(plan.risk_level, RiskLevel::High);
    assert!(plan.requires_approval);

    let mut registry = ActionRegistry::new();
    registry.register("message", "delete", Arc::new(NeverCalledHandler));
    let audit = Arc::new(AuditLog::new(dir.path().join("audit")).unwrap());
    let router = Arc::new(ActionRouter::new(registry, urg, audit.clone()));
    let checkpoints: Arc<dyn CheckpointStore> =
        Arc::new(JsonlCheckpointStore::new(dir.path().join("checkpoints.jsonl"), dir.path().join("resume.jsonl"), 72));
    let executor = PlanExecutor::new(router, checkpoints, audit);

    let result = executor.execute_plan(&plan, "tenant-a", "bob", false).await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Paused);
    assert!(result.checkpoint_id.is_some());
}
