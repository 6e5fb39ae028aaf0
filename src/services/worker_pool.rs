//! Worker pool (spec §4.L): maintains `n` worker tasks each running the
//! worker loop (§4.M). Grounded on `relay_ai.scale.worker_pool.WorkerPool`'s
//! `submit_job`/`scale_to`/`shutdown`/`get_stats` surface, reshaped per
//! REDESIGN FLAGS: each worker is an independent tokio task holding only a
//! `CancellationToken` handle rather than a thread joined through a queue of
//! sentinel values, and `submit_job` forwards straight to the shared
//! `JobQueue` (the pool's "internal FIFO channel" *is* that queue) instead
//! of a pool-private one, since every worker already pulls from it.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::models::Job;
use crate::domain::ports::errors::OrchestratorError;
use crate::domain::ports::queue::JobQueue;
use crate::services::worker_loop::{self, WorkerDeps};

struct Worker {
    #[allow(dead_code)]
    id: String,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

fn spawn_worker(deps: &Arc<WorkerDeps>, region: &str, next_id: &std::sync::atomic::AtomicU64) -> Worker {
    let id = format!("{region}-worker-{}", next_id.fetch_add(1, Ordering::SeqCst));
    let token = CancellationToken::new();
    let worker_deps = deps.clone();
    let worker_id = id.clone();
    let worker_token = token.clone();
    let handle = tokio::spawn(async move {
        worker_loop::run_worker(worker_deps, &worker_id, worker_token).await;
    });
    Worker { id, token, handle }
}

/// Snapshot returned by `PoolStats`, mirroring `WorkerPool.get_stats()`'s
/// breakdown. `active_workers`/`idle_workers` are derived from the shared
/// `in_flight` counter rather than tracked per worker, so they describe the
/// pool in aggregate, not a specific task's state.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub total_workers: usize,
    pub active_workers: usize,
    pub idle_workers: usize,
    pub queue_depth: usize,
}

/// Pool of worker tasks sharing one `WorkerDeps`. Workers are identified by
/// a monotonically increasing suffix (`{region}-worker-{n}`) so scale-down
/// always drains the oldest workers first, as spec §4.L requires.
pub struct WorkerPool {
    deps: Arc<WorkerDeps>,
    region: String,
    workers: tokio::sync::Mutex<Vec<Worker>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl WorkerPool {
    /// Spawn `initial_workers` tasks immediately, as the teacher's
    /// constructors eagerly start their background work rather than
    /// deferring to a separate `start()` call.
    pub fn new(deps: Arc<WorkerDeps>, initial_workers: usize, region: impl Into<String>) -> Self {
        let next_id = std::sync::atomic::AtomicU64::new(0);
        let region = region.into();
        let workers = (0..initial_workers).map(|_| spawn_worker(&deps, &region, &next_id)).collect();
        Self {
            deps,
            region,
            workers: tokio::sync::Mutex::new(workers),
            next_id,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Route `job` onto the shared queue every worker polls.
    pub async fn submit_job(&self, job: Job) -> Result<Uuid, OrchestratorError> {
        self.deps.queue.enqueue(job).await
    }

    /// Grow or shrink to exactly `n` workers. Growing spawns `n - current`
    /// fresh tasks; shrinking cancels the oldest `current - n` tasks and
    /// waits for each to finish its in-flight job before returning, the
    /// drain-then-exit contract spec §4.L describes. A no-op call (`n ==
    /// current`) always succeeds.
    pub async fn scale_to(&self, n: usize) -> Result<bool, OrchestratorError> {
        let mut workers = self.workers.lock().await;

        if workers.len() < n {
            while workers.len() < n {
                workers.push(spawn_worker(&self.deps, &self.region, &self.next_id));
            }
            return Ok(true);
        }

        let mut draining = Vec::new();
        while workers.len() > n {
            draining.push(workers.remove(0));
        }
        drop(workers);

        for worker in draining {
            worker.token.cancel();
            let _ = worker.handle.await;
        }
        Ok(true)
    }

    /// Cancel every worker and wait up to `timeout` for the drain to
    /// finish; workers still running past the deadline are abandoned
    /// (their `JoinHandle` is dropped, not aborted, so an in-flight job
    /// still completes, matching "at least once" delivery) rather than
    /// forcibly killed.
    pub async fn shutdown(&self, timeout: Duration) {
        let mut workers = self.workers.lock().await;
        for worker in workers.iter() {
            worker.token.cancel();
        }
        let draining = std::mem::take(&mut *workers);
        drop(workers);

        let _ = tokio::time::timeout(timeout, futures_join_all(draining)).await;
    }

    pub async fn stats(&self) -> PoolStats {
        let total_workers = self.workers.lock().await.len();
        let active_workers = self.deps.in_flight.load(Ordering::SeqCst).min(total_workers);
        let queue_depth = self.deps.queue.depth().await.unwrap_or(0);
        PoolStats {
            total_workers,
            active_workers,
            idle_workers: total_workers.saturating_sub(active_workers),
            queue_depth,
        }
    }
}

async fn futures_join_all(workers: Vec<Worker>) {
    for worker in workers {
        let _ = worker.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Dag, DagSource, Task, TaskKind};
    use crate::domain::ports::workflow_registry::WorkflowRegistry;
    use crate::services::backoff::BackoffConfig;
    use crate::services::checkpoint_store::JsonlCheckpointStore;
    use crate::services::dag_runner::DagRunner;
    use crate::services::idempotency::DurableIdempotencyTracker;
    use crate::services::queue::InMemoryJobQueue;
    use crate::services::rate_limiter::{BucketConfig, RateLimiter};
    use crate::services::worker_loop::WorkerConfig;
    use nonzero_ext::nonzero;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use tempfile::tempdir;

    fn echo_dag() -> Dag {
        Dag {
            name: "d".into(),
            tenant_id: "tenant-a".into(),
            tasks: vec![Task {
                id: "only".into(),
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
            }],
        }
    }

    async fn test_deps(dir: &std::path::Path) -> Arc<WorkerDeps> {
        let mut registry = WorkflowRegistry::new();
        registry.register("echo", Arc::new(|params: HashMap<String, serde_json::Value>| async move { Ok(params) }));

        let checkpoints = Arc::new(JsonlCheckpointStore::new(dir.join("checkpoints.jsonl"), dir.join("resume.jsonl"), 72));
        let runner = Arc::new(DagRunner::new(Arc::new(registry), checkpoints, dir.join("events.jsonl")));
        let idempotency = Arc::new(DurableIdempotencyTracker::load(dir.join("idempotency.jsonl")).await.unwrap());
        let rate_limiter = Arc::new(RateLimiter::new(
            BucketConfig {
                capacity: nonzero!(1000u32),
                refill_per_second: nonzero!(1000u32),
            },
            BucketConfig {
                capacity: nonzero!(1000u32),
                refill_per_second: nonzero!(1000u32),
            },
        ));
        let queue = Arc::new(InMemoryJobQueue::new());

        Arc::new(WorkerDeps {
            queue,
            runner,
            idempotency,
            rate_limiter,
            events_path: dir.join("worker_events.jsonl"),
            in_flight: Arc::new(AtomicUsize::new(0)),
            config: WorkerConfig {
                poll_ms: 10,
                visibility_ms: 5_000,
                heartbeat_ms: 50_000,
                max_retries: 2,
                rate_limit_retry_delay_ms: 1,
                backoff: BackoffConfig {
                    base_ms: 1,
                    cap_ms: 2,
                    jitter_pct: 0.0,
                    max_retries: 2,
                    max_total_time: Duration::from_secs(5),
                },
            },
        })
    }

    #[tokio::test]
    async fn scale_to_grows_and_shrinks_worker_count() {
        let dir = tempdir().unwrap();
        let deps = test_deps(dir.path()).await;
        let pool = WorkerPool::new(deps, 0, "us-west");

        pool.scale_to(3).await.unwrap();
        assert_eq!(pool.stats().await.total_workers, 3);

        pool.scale_to(1).await.unwrap();
        assert_eq!(pool.stats().await.total_workers, 1);

        pool.shutdown(Duration::from_secs(2)).await;
        assert_eq!(pool.stats().await.total_workers, 0);
    }

    #[tokio::test]
    async fn submitted_job_is_processed_by_pool() {
        let dir = tempdir().unwrap();
        let deps = test_deps(dir.path()).await;
        let queue = deps.queue.clone();
        let pool = WorkerPool::new(deps, 0, "default");
        pool.scale_to(2).await.unwrap();

        let job = Job::new(DagSource::Inline(echo_dag()), "tenant-a");
        let id = job.id;
        pool.submit_job(job).await.unwrap();

        let mut waited = Duration::ZERO;
        loop {
            if queue.depth().await.unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            waited += Duration::from_millis(20);
            if waited > Duration::from_secs(2) {
                panic!("job {id} was not picked up in time");
            }
        }

        pool.shutdown(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn scale_to_same_count_is_noop() {
        let dir = tempdir().unwrap();
        let deps = test_deps(dir.path()).await;
        let pool = WorkerPool::new(deps, 0, "default");

        pool.scale_to(2).await.unwrap();
        assert!(pool.scale_to(2).await.unwrap());
        assert_eq!(pool.stats().await.total_workers, 2);

        pool.shutdown(Duration::from_secs(2)).await;
    }
}
