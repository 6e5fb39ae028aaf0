//! Persistent job queue (spec §4.D): an in-memory reference implementation
//! and a Redis-backed one behind the same `JobQueue` port. Priority and
//! FIFO-within-priority ordering, and the retry/backoff/DLQ shape, are
//! grounded on `original_source/.../queue_strategy.py`.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::models::{DeadLetter, Job, JobStatus};
use crate::domain::ports::errors::OrchestratorError;
use crate::domain::ports::queue::JobQueue;

/// Ordering key for the priority heap: higher `priority` dequeues first;
/// ties break by insertion order (lower `sequence` first), giving FIFO
/// within a priority band the way `queue_strategy.py`'s `PriorityQueue`
/// does.
#[derive(Debug, Eq, PartialEq)]
struct QueueEntry {
    priority: i32,
    sequence: u64,
    job_id: Uuid,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct State {
    heap: BinaryHeap<QueueEntry>,
    jobs: HashMap<Uuid, Job>,
    dlq: Vec<DeadLetter>,
}

/// Single-process reference queue. Visibility is implemented by leaving a
/// dequeued job out of the heap until `extend_visibility`/`update_status`
/// puts it back (on retry) or removes it (terminal states); a lease that
/// is never extended simply never reappears, matching the "at least once,
/// caller-driven requeue" contract rather than a background sweep.
pub struct InMemoryJobQueue {
    state: Mutex<State>,
    sequence: AtomicU64,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                heap: BinaryHeap::new(),
                jobs: HashMap::new(),
                dlq: Vec::new(),
            }),
            sequence: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("queue mutex poisoned")
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: Job) -> Result<Uuid, OrchestratorError> {
        let id = job.id;
        let priority = job.priority.unwrap_or(0);
        let sequence = self.sequence.fetch_add(1, AtomicOrdering::SeqCst);

        let mut state = self.lock();
        state.jobs.insert(id, job);
        state.heap.push(QueueEntry {
            priority,
            sequence,
            job_id: id,
        });
        Ok(id)
    }

    async fn dequeue(&self, visibility_ms: u64) -> Result<Option<Job>, OrchestratorError> {
        let mut state = self.lock();
        let Some(entry) = state.heap.pop() else {
            return Ok(None);
        };

        let lease_until = Utc::now() + chrono::Duration::milliseconds(visibility_ms as i64);
        let job = state
            .jobs
            .get_mut(&entry.job_id)
            .ok_or_else(|| OrchestratorError::fatal("queue entry referenced a missing job"))?;
        job.status = JobStatus::Running;
        job.attempts += 1;
        job.lease_until = Some(lease_until);
        Ok(Some(job.clone()))
    }

    async fn extend_visibility(&self, job_id: Uuid, ms: u64) -> Result<(), OrchestratorError> {
        let mut state = self.lock();
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| OrchestratorError::not_found(format!("job {job_id} not found")))?;
        job.lease_until = Some(Utc::now() + chrono::Duration::milliseconds(ms as i64));
        Ok(())
    }

    async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<(), OrchestratorError> {
        let mut state = self.lock();
        let priority_and_sequence = {
            let job = state
                .jobs
                .get_mut(&job_id)
                .ok_or_else(|| OrchestratorError::not_found(format!("job {job_id} not found")))?;
            job.status = status;
            job.last_error = error;
            if let Some(result) = result {
                job.failure_reason = result.get("failure_reason").and_then(|v| v.as_str()).map(str::to_string);
            }
            (job.priority.unwrap_or(0), job.attempts)
        };

        if status == JobStatus::Retry {
            let sequence = self.sequence.fetch_add(1, AtomicOrdering::SeqCst);
            state.heap.push(QueueEntry {
                priority: priority_and_sequence.0,
                sequence,
                job_id,
            });
        }
        Ok(())
    }

    async fn move_to_dlq(&self, job_id: Uuid, reason: &str) -> Result<(), OrchestratorError> {
        let mut state = self.lock();
        let mut job = state
            .jobs
            .remove(&job_id)
            .ok_or_else(|| OrchestratorError::not_found(format!("job {job_id} not found")))?;
        job.status = JobStatus::Failed;
        job.failure_reason = Some(reason.to_string());
        state.dlq.push(DeadLetter {
            job,
            reason: reason.to_string(),
            failed_at: Utc::now(),
        });
        Ok(())
    }

    async fn dlq_entries(&self) -> Result<Vec<DeadLetter>, OrchestratorError> {
        Ok(self.lock().dlq.clone())
    }

    async fn depth(&self) -> Result<usize, OrchestratorError> {
        Ok(self.lock().heap.len())
    }
}
