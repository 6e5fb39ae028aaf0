//! Worker entry point (spec §6 CLI surface): `--poll-ms`, `--worker-id`.
//! Runs a single worker loop until interrupted, grounded on
//! `services::worker_loop::run_worker`.

use clap::Args;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::services::worker_loop::{self, WorkerConfig, WorkerDeps};

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Poll interval in milliseconds when the queue is empty.
    #[arg(long, default_value = "500")]
    pub poll_ms: u64,

    /// Identifier recorded against jobs this worker leases.
    #[arg(long)]
    pub worker_id: Option<String>,
}

/// Run one worker until `token` is cancelled (e.g. on SIGINT), overriding
/// `deps.config.poll_ms` with the CLI flag.
pub async fn run(args: WorkerArgs, mut deps: WorkerDeps, token: CancellationToken) {
    deps.config = WorkerConfig {
        poll_ms: args.poll_ms,
        ..deps.config
    };
    let worker_id = args.worker_id.unwrap_or_else(|| format!("cli-worker-{}", uuid::Uuid::new_v4()));
    worker_loop::run_worker(Arc::new(deps), &worker_id, token).await;
}
