//! Autoscaler (spec §4.L): a control loop that reads engine state and
//! decides whether to grow, shrink, or hold the worker pool. Grounded on
//! `relay_ai.scale.autoscaler.make_scale_decision`'s threshold table,
//! reimplemented with an explicit `AutoscalerConfig` struct passed in by the
//! caller instead of `os.environ.get(...)` reads scattered through the
//! decision function, per REDESIGN FLAGS (injected config over ambient
//! globals).

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::services::telemetry::Telemetry;
use crate::services::worker_pool::WorkerPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDirection {
    Up,
    Down,
    Hold,
}

/// Everything a scale decision needs to know about the system right now.
#[derive(Debug, Clone, Copy)]
pub struct EngineState {
    pub current_workers: usize,
    pub queue_depth: usize,
    pub p95_latency_ms: f64,
    pub in_flight_jobs: usize,
    pub last_scale_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ScaleDecision {
    pub direction: ScaleDirection,
    pub desired_workers: usize,
    pub reason: String,
}

/// Scale-decision thresholds, loaded once from config rather than read from
/// the environment on every tick.
#[derive(Debug, Clone, Copy)]
pub struct AutoscalerConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    pub target_queue_depth: usize,
    pub target_p95_latency_ms: f64,
    pub scale_up_step: usize,
    pub scale_down_step: usize,
    pub decision_interval_ms: u64,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            min_workers: 1,
            max_workers: 12,
            target_queue_depth: 50,
            target_p95_latency_ms: 2_000.0,
            scale_up_step: 2,
            scale_down_step: 1,
            decision_interval_ms: 15_000,
        }
    }
}

/// Apply the spec §4.L decision table to `state`, clamped to
/// `[min_workers, max_workers]` and gated by the cooldown since
/// `state.last_scale_time`.
pub fn make_scale_decision(state: EngineState, config: &AutoscalerConfig) -> ScaleDecision {
    if let Some(last_scale) = state.last_scale_time {
        let elapsed = (Utc::now() - last_scale).num_milliseconds().max(0) as u64;
        if elapsed < config.decision_interval_ms {
            return ScaleDecision {
                direction: ScaleDirection::Hold,
                desired_workers: state.current_workers,
                reason: "cooldown active since last scaling decision".to_string(),
            };
        }
    }

    let mut up_reasons = Vec::new();
    if state.queue_depth > config.target_queue_depth {
        up_reasons.push("queue depth exceeds target".to_string());
    }
    if state.p95_latency_ms > config.target_p95_latency_ms {
        up_reasons.push("p95 latency exceeds target".to_string());
    }
    if state.in_flight_jobs >= state.current_workers && state.queue_depth > 0 {
        up_reasons.push("all workers busy with queue backlog".to_string());
    }

    if !up_reasons.is_empty() {
        let desired = (state.current_workers + config.scale_up_step).min(config.max_workers);
        return ScaleDecision {
            direction: ScaleDirection::Up,
            desired_workers: desired,
            reason: up_reasons.join("; "),
        };
    }

    let queue_low = (state.queue_depth as f64) < 0.3 * config.target_queue_depth as f64;
    let latency_low = state.p95_latency_ms < 0.5 * config.target_p95_latency_ms;
    let utilization = if state.current_workers == 0 {
        0.0
    } else {
        state.in_flight_jobs as f64 / state.current_workers as f64
    };
    let utilization_low = utilization < 0.7;

    if queue_low && latency_low && utilization_low && state.current_workers > config.min_workers {
        let desired = state.current_workers.saturating_sub(config.scale_down_step).max(config.min_workers);
        return ScaleDecision {
            direction: ScaleDirection::Down,
            desired_workers: desired,
            reason: format!("low utilization ({:.0}%) with queue and latency below thresholds", utilization * 100.0),
        };
    }

    ScaleDecision {
        direction: ScaleDirection::Hold,
        desired_workers: state.current_workers,
        reason: "metrics stable, no scaling needed".to_string(),
    }
}

/// Background control loop driving one `WorkerPool`: every
/// `decision_interval_ms` it samples pool/queue state, computes a
/// decision, and applies it via `scale_to`. Runs as an independent tokio
/// task, per spec §5, holding only an `Arc<WorkerPool>` handle.
pub struct Autoscaler {
    pool: Arc<WorkerPool>,
    config: AutoscalerConfig,
    telemetry: Arc<Telemetry>,
}

impl Autoscaler {
    pub fn new(pool: Arc<WorkerPool>, config: AutoscalerConfig, telemetry: Arc<Telemetry>) -> Self {
        Self { pool, config, telemetry }
    }

    /// Run the control loop until `token` is cancelled. `p95_latency_ms` is
    /// sampled through `latency_sample`, since latency tracking lives in
    /// the telemetry layer rather than the pool itself.
    pub async fn run(&self, token: CancellationToken, latency_sample: impl Fn() -> f64) {
        let mut last_scale_time: Option<DateTime<Utc>> = None;

        loop {
            tokio::select! {
                () = token.cancelled() => return,
                () = tokio::time::sleep(Duration::from_millis(self.config.decision_interval_ms)) => {}
            }

            let stats = self.pool.stats().await;
            let state = EngineState {
                current_workers: stats.total_workers,
                queue_depth: stats.queue_depth,
                p95_latency_ms: latency_sample(),
                in_flight_jobs: stats.active_workers,
                last_scale_time,
            };

            let decision = make_scale_decision(state, &self.config);
            tracing::debug!(
                direction = ?decision.direction,
                desired_workers = decision.desired_workers,
                reason = %decision.reason,
                "autoscaler decision"
            );

            if decision.direction != ScaleDirection::Hold {
                if let Ok(true) = self.pool.scale_to(decision.desired_workers).await {
                    last_scale_time = Some(Utc::now());
                    self.telemetry.incr("autoscaler.scaled", &[]);
                }
            }
        }
    }
}
