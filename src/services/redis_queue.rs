//! Redis-backed job queue (spec §4.D), selected by `QUEUE_BACKEND=redis`.
//! Grounded on `original_source/.../src/queue/worker.py`'s
//! `get_queue_backend()` (which falls back to the in-memory queue when
//! Redis is unavailable) and the `backends/redis.py` shape it wraps,
//! reimplemented with `redis`'s async `ConnectionManager` instead of a
//! lazily-imported client.
//!
//! Layout, all under one `key_prefix`:
//! - `{prefix}:ready` — sorted set, score = `-priority * 1e12 + sequence` so
//!   `ZPOPMIN` yields highest priority first, FIFO within a priority band.
//! - `{prefix}:job:{id}` — hash of the job's JSON-serialized fields.
//! - `{prefix}:dlq` — list of JSON-serialized `DeadLetter`s.
//! - `{prefix}:seq` — integer counter for the sequence component above.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::models::{DeadLetter, Job, JobStatus};
use crate::domain::ports::errors::OrchestratorError;
use crate::domain::ports::queue::JobQueue;

pub struct RedisJobQueue {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisJobQueue {
    pub async fn connect(redis_url: &str, prefix: impl Into<String>) -> Result<Self, OrchestratorError> {
        let client = redis::Client::open(redis_url).map_err(|e| OrchestratorError::fatal(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| OrchestratorError::fatal(format!("connecting to redis: {e}")))?;
        Ok(Self { conn, prefix: prefix.into() })
    }

    fn ready_key(&self) -> String {
        format!("{}:ready", self.prefix)
    }

    fn job_key(&self, id: Uuid) -> String {
        format!("{}:job:{id}", self.prefix)
    }

    fn dlq_key(&self) -> String {
        format!("{}:dlq", self.prefix)
    }

    fn seq_key(&self) -> String {
        format!("{}:seq", self.prefix)
    }

    fn score(priority: i32, sequence: i64) -> f64 {
        f64::from(-priority) * 1e12 + sequence as f64
    }

    async fn store_job(&self, conn: &mut ConnectionManager, job: &Job) -> Result<(), OrchestratorError> {
        let payload = serde_json::to_string(job).map_err(|e| OrchestratorError::fatal(format!("serializing job: {e}")))?;
        let _: () = conn
            .set(self.job_key(job.id), payload)
            .await
            .map_err(|e| OrchestratorError::retryable(format!("redis SET failed: {e}")))?;
        Ok(())
    }

    async fn load_job(&self, conn: &mut ConnectionManager, id: Uuid) -> Result<Job, OrchestratorError> {
        let payload: String = conn
            .get(self.job_key(id))
            .await
            .map_err(|e| OrchestratorError::retryable(format!("redis GET failed: {e}")))?;
        serde_json::from_str(&payload).map_err(|e| OrchestratorError::fatal(format!("deserializing job {id}: {e}")))
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: Job) -> Result<Uuid, OrchestratorError> {
        let mut conn = self.conn.clone();
        let id = job.id;
        let priority = job.priority.unwrap_or(0);

        let sequence: i64 = conn
            .incr(self.seq_key(), 1)
            .await
            .map_err(|e| OrchestratorError::retryable(format!("redis INCR failed: {e}")))?;

        self.store_job(&mut conn, &job).await?;

        let _: () = conn
            .zadd(self.ready_key(), id.to_string(), Self::score(priority, sequence))
            .await
            .map_err(|e| OrchestratorError::retryable(format!("redis ZADD failed: {e}")))?;

        Ok(id)
    }

    async fn dequeue(&self, visibility_ms: u64) -> Result<Option<Job>, OrchestratorError> {
        let mut conn = self.conn.clone();

        let popped: Vec<(String, f64)> = conn
            .zpopmin(self.ready_key(), 1)
            .await
            .map_err(|e| OrchestratorError::retryable(format!("redis ZPOPMIN failed: {e}")))?;

        let Some((id_str, _)) = popped.into_iter().next() else {
            return Ok(None);
        };
        let id = Uuid::parse_str(&id_str).map_err(|e| OrchestratorError::fatal(format!("corrupt job id in ready set: {e}")))?;

        let mut job = self.load_job(&mut conn, id).await?;
        job.status = JobStatus::Running;
        job.attempts += 1;
        job.lease_until = Some(Utc::now() + chrono::Duration::milliseconds(visibility_ms as i64));
        self.store_job(&mut conn, &job).await?;

        Ok(Some(job))
    }

    async fn extend_visibility(&self, job_id: Uuid, ms: u64) -> Result<(), OrchestratorError> {
        let mut conn = self.conn.clone();
        let mut job = self.load_job(&mut conn, job_id).await?;
        job.lease_until = Some(Utc::now() + chrono::Duration::milliseconds(ms as i64));
        self.store_job(&mut conn, &job).await
    }

    async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<(), OrchestratorError> {
        let mut conn = self.conn.clone();
        let mut job = self.load_job(&mut conn, job_id).await?;
        job.status = status;
        job.last_error = error;
        if let Some(result) = result {
            job.failure_reason = result.get("failure_reason").and_then(|v| v.as_str()).map(str::to_string);
        }
        self.store_job(&mut conn, &job).await?;

        if status == JobStatus::Retry {
            let sequence: i64 = conn
                .incr(self.seq_key(), 1)
                .await
                .map_err(|e| OrchestratorError::retryable(format!("redis INCR failed: {e}")))?;
            let _: () = conn
                .zadd(self.ready_key(), job_id.to_string(), Self::score(job.priority.unwrap_or(0), sequence))
                .await
                .map_err(|e| OrchestratorError::retryable(format!("redis ZADD failed: {e}")))?;
        }
        Ok(())
    }

    async fn move_to_dlq(&self, job_id: Uuid, reason: &str) -> Result<(), OrchestratorError> {
        let mut conn = self.conn.clone();
        let mut job = self.load_job(&mut conn, job_id).await?;
        job.status = JobStatus::Failed;
        job.failure_reason = Some(reason.to_string());

        let entry = DeadLetter {
            job,
            reason: reason.to_string(),
            failed_at: Utc::now(),
        };
        let payload = serde_json::to_string(&entry).map_err(|e| OrchestratorError::fatal(format!("serializing dead letter: {e}")))?;

        let _: () = conn
            .rpush(self.dlq_key(), payload)
            .await
            .map_err(|e| OrchestratorError::retryable(format!("redis RPUSH failed: {e}")))?;
        let _: () = conn
            .del(self.job_key(job_id))
            .await
            .map_err(|e| OrchestratorError::retryable(format!("redis DEL failed: {e}")))?;
        Ok(())
    }

    async fn dlq_entries(&self) -> Result<Vec<DeadLetter>, OrchestratorError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .lrange(self.dlq_key(), 0, -1)
            .await
            .map_err(|e| OrchestratorError::retryable(format!("redis LRANGE failed: {e}")))?;

        raw.into_iter()
            .map(|line| serde_json::from_str(&line).map_err(|e| OrchestratorError::fatal(format!("deserializing dead letter: {e}"))))
            .collect()
    }

    async fn depth(&self) -> Result<usize, OrchestratorError> {
        let mut conn = self.conn.clone();
        let count: usize = conn
            .zcard(self.ready_key())
            .await
            .map_err(|e| OrchestratorError::retryable(format!("redis ZCARD failed: {e}")))?;
        Ok(count)
    }
}
