//! Worker loop (spec §4.M): the per-worker job-processing cycle a
//! `WorkerPool` task runs repeatedly. Grounded on
//! `original_source/.../src/queue/worker.py`'s `execute_job`/`main` loop,
//! reshaped per REDESIGN FLAGS: the `HeartbeatThread` becomes an
//! independent tokio task racing the DAG run via `tokio::select!`, and
//! `sys.exit`/bare prints become a typed `Result` plus `tracing` events.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::domain::models::{DagSource, Job, JobStatus};
use crate::domain::ports::errors::OrchestratorError;
use crate::domain::ports::queue::JobQueue;
use crate::services::backoff::{self, BackoffConfig};
use crate::services::dag_runner::{DagRunner, RunStatus};
use crate::services::idempotency::DurableIdempotencyTracker;
use crate::services::jsonl::append_jsonl_line;
use crate::services::rate_limiter::RateLimiter;

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub poll_ms: u64,
    pub visibility_ms: u64,
    pub heartbeat_ms: u64,
    pub max_retries: u32,
    pub rate_limit_retry_delay_ms: u64,
    pub backoff: BackoffConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_ms: 1_000,
            visibility_ms: 30_000,
            heartbeat_ms: 15_000,
            max_retries: 3,
            rate_limit_retry_delay_ms: 8_000,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Everything one worker needs, injected rather than reached for through
/// globals: the queue it polls, the runner it hands DAGs to, the
/// idempotency/rate-limit guards, and where to log run events.
pub struct WorkerDeps {
    pub queue: Arc<dyn JobQueue>,
    pub runner: Arc<DagRunner>,
    pub idempotency: Arc<DurableIdempotencyTracker>,
    pub rate_limiter: Arc<RateLimiter>,
    pub events_path: PathBuf,
    pub config: WorkerConfig,
    /// Count of jobs currently being processed across every worker sharing
    /// these deps, read by `worker_pool`/`autoscaler` as the `in_flight`
    /// scale-decision input.
    pub in_flight: Arc<AtomicUsize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkerEvent {
    timestamp: chrono::DateTime<Utc>,
    event: String,
    job_id: uuid::Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tenant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempts: Option<u32>,
}

async fn record(deps: &WorkerDeps, event: WorkerEvent) {
    let _ = append_jsonl_line(&deps.events_path, &event).await;
}

async fn load_dag(source: &DagSource) -> Result<crate::domain::models::Dag, OrchestratorError> {
    match source {
        DagSource::Inline(dag) => Ok(dag.clone()),
        DagSource::Path(path) => {
            let contents = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| OrchestratorError::fatal(format!("reading DAG file {path}: {e}")))?;
            serde_yaml::from_str(&contents).map_err(|e| OrchestratorError::validation(format!("parsing DAG file {path}: {e}")))
        }
    }
}

/// Run one worker's main loop until `token` is cancelled. Each iteration
/// polls `dequeue`; an empty queue sleeps `poll_ms` (interruptibly, so
/// cancellation during an idle sleep still exits promptly).
pub async fn run_worker(deps: Arc<WorkerDeps>, worker_id: &str, token: CancellationToken) {
    loop {
        if token.is_cancelled() {
            return;
        }

        match deps.queue.dequeue(deps.config.visibility_ms).await {
            Ok(Some(job)) => {
                deps.in_flight.fetch_add(1, Ordering::SeqCst);
                process_job(&deps, job, worker_id).await;
                deps.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
            Ok(None) => {
                tokio::select! {
                    () = token.cancelled() => return,
                    () = tokio::time::sleep(Duration::from_millis(deps.config.poll_ms)) => {}
                }
            }
            Err(err) => {
                tracing::error!(worker_id, error = %err, "dequeue failed");
                tokio::time::sleep(Duration::from_millis(deps.config.poll_ms)).await;
            }
        }
    }
}

async fn process_job(deps: &WorkerDeps, job: Job, worker_id: &str) {
    if let Some(run_id) = &job.run_id {
        if deps.idempotency.is_duplicate(run_id) {
            tracing::info!(worker_id, job_id = %job.id, run_id, "job already processed, skipping");
            let _ = deps
                .queue
                .update_status(job.id, JobStatus::Success, Some(serde_json::json!({"skipped": "duplicate"})), None)
                .await;
            record(
                deps,
                WorkerEvent {
                    timestamp: Utc::now(),
                    event: "run_finished".to_string(),
                    job_id: job.id,
                    run_id: Some(run_id.clone()),
                    tenant: Some(job.tenant_id.clone()),
                    status: Some("skipped_duplicate".to_string()),
                    error: None,
                    attempts: None,
                },
            )
            .await;
            return;
        }
    }

    if !deps.rate_limiter.allow(&job.tenant_id) {
        tracing::warn!(worker_id, job_id = %job.id, tenant = %job.tenant_id, "rate limited, requeuing");
        tokio::time::sleep(Duration::from_millis(deps.config.rate_limit_retry_delay_ms)).await;
        let _ = deps.queue.update_status(job.id, JobStatus::Retry, None, None).await;
        record(
            deps,
            WorkerEvent {
                timestamp: Utc::now(),
                event: "run_finished".to_string(),
                job_id: job.id,
                run_id: job.run_id.clone(),
                tenant: Some(job.tenant_id.clone()),
                status: Some("rate_limited".to_string()),
                error: None,
                attempts: None,
            },
        )
        .await;
        return;
    }

    record(
        deps,
        WorkerEvent {
            timestamp: Utc::now(),
            event: "run_started".to_string(),
            job_id: job.id,
            run_id: job.run_id.clone(),
            tenant: Some(job.tenant_id.clone()),
            status: None,
            error: None,
            attempts: None,
        },
    )
    .await;

    let heartbeat_token = CancellationToken::new();
    let heartbeat_handle = {
        let queue = deps.queue.clone();
        let job_id = job.id;
        let interval = Duration::from_millis(deps.config.heartbeat_ms);
        let visibility_ms = deps.config.visibility_ms;
        let token = heartbeat_token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => return,
                    () = tokio::time::sleep(interval) => {
                        let _ = queue.extend_visibility(job_id, visibility_ms).await;
                    }
                }
            }
        })
    };

    let outcome = run_job_dag(deps, &job).await;

    heartbeat_token.cancel();
    let _ = heartbeat_handle.await;

    match outcome {
        Ok(run_outcome) => {
            let result = serde_json::json!({
                "status": if run_outcome.status == RunStatus::Success { "success" } else { "paused" },
                "tasks_succeeded": run_outcome.tasks_succeeded,
                "tasks_failed": run_outcome.tasks_failed,
                "dag_run_id": run_outcome.dag_run_id,
            });
            let _ = deps.queue.update_status(job.id, JobStatus::Success, Some(result), None).await;

            if let Some(run_id) = &job.run_id {
                let _ = deps.idempotency.mark_completed(run_id, Some(serde_json::json!({"job_id": job.id}))).await;
            }

            record(
                deps,
                WorkerEvent {
                    timestamp: Utc::now(),
                    event: "run_finished".to_string(),
                    job_id: job.id,
                    run_id: job.run_id.clone(),
                    tenant: Some(job.tenant_id.clone()),
                    status: Some("success".to_string()),
                    error: None,
                    attempts: None,
                },
            )
            .await;
        }
        Err(err) => handle_failure(deps, job, err, worker_id).await,
    }
}

async fn run_job_dag(deps: &WorkerDeps, job: &Job) -> Result<crate::services::dag_runner::RunOutcome, OrchestratorError> {
    let dag = load_dag(&job.dag).await?;
    deps.runner.run_dag(&dag, &job.tenant_id).await
}

async fn handle_failure(deps: &WorkerDeps, job: Job, err: OrchestratorError, worker_id: &str) {
    let attempts = job.attempts;
    if attempts + 1 >= deps.config.max_retries {
        tracing::warn!(worker_id, job_id = %job.id, error = %err, "job exhausted retries, moving to DLQ");
        let _ = deps.queue.update_status(job.id, JobStatus::Failed, None, Some(err.to_string())).await;
        let _ = deps.queue.move_to_dlq(job.id, "max_retries").await;

        record(
            deps,
            WorkerEvent {
                timestamp: Utc::now(),
                event: "run_failed_terminal".to_string(),
                job_id: job.id,
                run_id: job.run_id.clone(),
                tenant: Some(job.tenant_id.clone()),
                status: Some("failed_terminal".to_string()),
                error: Some(err.to_string()),
                attempts: Some(attempts + 1),
            },
        )
        .await;
        return;
    }

    let delay = backoff::delay(attempts, deps.config.backoff.base_ms, deps.config.backoff.cap_ms, deps.config.backoff.jitter_pct);
    tracing::info!(worker_id, job_id = %job.id, delay_ms = delay.as_millis() as u64, "job failed, retrying with backoff");
    tokio::time::sleep(delay).await;

    let _ = deps.queue.update_status(job.id, JobStatus::Retry, None, Some(err.to_string())).await;

    record(
        deps,
        WorkerEvent {
            timestamp: Utc::now(),
            event: "run_finished".to_string(),
            job_id: job.id,
            run_id: job.run_id.clone(),
            tenant: Some(job.tenant_id.clone()),
            status: Some("retry".to_string()),
            error: Some(err.to_string()),
            attempts: Some(attempts + 1),
        },
    )
    .await;
}
