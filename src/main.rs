//! Binary entry point: load config, initialize logging, wire every
//! service, then dispatch the CLI. Grounded on the teacher's `main.rs`
//! wiring order (config before logging before services before command
//! dispatch).

use anyhow::{Context, Result};
use clap::Parser;
use std::num::NonZeroU32;
use std::sync::Arc;

use orchestrator_core::cli::commands::{connectors, worker};
use orchestrator_core::cli::{Cli, Commands};
use orchestrator_core::connectors::ConnectorRegistry;
use orchestrator_core::domain::ports::queue::JobQueue;
use orchestrator_core::domain::ports::workflow_registry::WorkflowRegistry;
use orchestrator_core::infrastructure::config::{Config, ConfigLoader, QueueBackend};
use orchestrator_core::infrastructure::logging::Logger;
use orchestrator_core::services::backoff::BackoffConfig;
use orchestrator_core::services::checkpoint_store::JsonlCheckpointStore;
use orchestrator_core::services::dag_runner::DagRunner;
use orchestrator_core::services::idempotency::DurableIdempotencyTracker;
use orchestrator_core::services::queue::InMemoryJobQueue;
use orchestrator_core::services::rate_limiter::{BucketConfig, RateLimiter};
use orchestrator_core::services::redis_queue::RedisJobQueue;
use orchestrator_core::services::worker_loop::{WorkerConfig, WorkerDeps};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ConfigLoader::load().context("loading configuration")?;
    let _logger = Logger::init(&config.logging).context("initializing logging")?;

    let cli = Cli::parse();
    let exit_code = dispatch(cli, &config).await?;
    std::process::exit(exit_code);
}

fn bucket(capacity: u32, refill_per_second: u32) -> BucketConfig {
    BucketConfig {
        capacity: NonZeroU32::new(capacity).unwrap_or(NonZeroU32::new(1).expect("1 is nonzero")),
        refill_per_second: NonZeroU32::new(refill_per_second).unwrap_or(NonZeroU32::new(1).expect("1 is nonzero")),
    }
}

async fn build_queue(config: &Config) -> Result<Arc<dyn JobQueue>> {
    match config.queue.backend {
        QueueBackend::Memory => Ok(Arc::new(InMemoryJobQueue::new())),
        QueueBackend::Redis => {
            let queue = RedisJobQueue::connect(&config.queue.redis_url, "orchestrator").await.context("connecting to redis")?;
            Ok(Arc::new(queue))
        }
    }
}

async fn build_worker_deps(config: &Config) -> Result<WorkerDeps> {
    let checkpoints = Arc::new(JsonlCheckpointStore::new(
        config.paths.checkpoints_path.clone(),
        config.paths.state_store_path.clone(),
        config.approval.expires_h,
    ));
    let registry = Arc::new(WorkflowRegistry::new());
    let runner = Arc::new(DagRunner::new(registry, checkpoints, config.paths.orch_events_path.clone()));
    let idempotency_path = config.paths.orch_events_path.with_file_name("idempotency.jsonl");
    let idempotency = Arc::new(DurableIdempotencyTracker::load(idempotency_path).await?);
    let rate_limiter = Arc::new(RateLimiter::new(
        bucket(config.rate_limit.global_capacity, config.rate_limit.global_refill_per_second),
        bucket(config.rate_limit.tenant_capacity, config.rate_limit.tenant_refill_per_second),
    ));
    let queue = build_queue(config).await?;

    Ok(WorkerDeps {
        queue,
        runner,
        idempotency,
        rate_limiter,
        events_path: config.paths.orch_events_path.clone(),
        in_flight: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        config: WorkerConfig {
            poll_ms: 500,
            visibility_ms: config.queue.visibility_ms,
            heartbeat_ms: config.queue.lease_heartbeat_ms,
            max_retries: config.retry.max_job_retries,
            rate_limit_retry_delay_ms: config.rate_limit.retry_delay_ms,
            backoff: BackoffConfig {
                base_ms: config.retry.requeue_base_ms,
                cap_ms: config.retry.requeue_cap_ms,
                jitter_pct: config.retry.requeue_jitter_pct,
                max_retries: config.retry.max_job_retries,
                max_total_time: std::time::Duration::from_secs(3600),
            },
        },
    })
}

async fn dispatch(cli: Cli, config: &Config) -> Result<i32> {
    match cli.command {
        Commands::Connectors(args) => {
            let connector_registry = Arc::new(ConnectorRegistry::new());
            Ok(connectors::run(args, connector_registry).await)
        }
        Commands::Worker(args) => {
            let deps = build_worker_deps(config).await.context("building worker dependencies")?;
            let token = tokio_util::sync::CancellationToken::new();
            let shutdown_token = token.clone();
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                shutdown_token.cancel();
            });
            worker::run(args, deps, token).await;
            Ok(0)
        }
    }
}
