//! Service implementations of the domain ports, plus a few
//! dependency-free helpers (`jsonl`, `backoff`) the ports don't define
//! traits for.

pub mod action_router;
pub mod audit_log;
pub mod autoscaler;
pub mod backoff;
pub mod checkpoint_store;
pub mod dag_runner;
pub mod idempotency;
pub mod jsonl;
pub mod nl;
pub mod queue;
pub mod rate_limiter;
pub mod redis_queue;
pub mod storage;
pub mod telemetry;
pub mod urg_index;
pub mod worker_loop;
pub mod worker_pool;
