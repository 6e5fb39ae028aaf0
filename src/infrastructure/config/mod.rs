//! Configuration model and loader (spec §6 "Configuration"). Grounded on
//! the teacher's `infrastructure::config` split: a plain `Config` struct
//! with `serde` defaults, plus a `ConfigLoader` that merges it from
//! layered sources via `figment`.

mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use loader::{ConfigError, ConfigLoader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    Memory,
    Redis,
}

impl Default for QueueBackend {
    fn default() -> Self {
        Self::Memory
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub backend: QueueBackend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_visibility_ms")]
    pub visibility_ms: u64,
    #[serde(default = "default_heartbeat_ms")]
    pub lease_heartbeat_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            redis_url: default_redis_url(),
            visibility_ms: default_visibility_ms(),
            lease_heartbeat_ms: default_heartbeat_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_job_retries")]
    pub max_job_retries: u32,
    #[serde(default = "default_requeue_base_ms")]
    pub requeue_base_ms: u64,
    #[serde(default = "default_requeue_cap_ms")]
    pub requeue_cap_ms: u64,
    #[serde(default = "default_requeue_jitter_pct")]
    pub requeue_jitter_pct: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_job_retries: default_max_job_retries(),
            requeue_base_ms: default_requeue_base_ms(),
            requeue_cap_ms: default_requeue_cap_ms(),
            requeue_jitter_pct: default_requeue_jitter_pct(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_capacity")]
    pub global_capacity: u32,
    #[serde(default = "default_rate_limit_refill")]
    pub global_refill_per_second: u32,
    #[serde(default = "default_rate_limit_capacity")]
    pub tenant_capacity: u32,
    #[serde(default = "default_rate_limit_refill")]
    pub tenant_refill_per_second: u32,
    #[serde(default = "default_rate_limit_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_capacity: default_rate_limit_capacity(),
            global_refill_per_second: default_rate_limit_refill(),
            tenant_capacity: default_rate_limit_capacity(),
            tenant_refill_per_second: default_rate_limit_refill(),
            retry_delay_ms: default_rate_limit_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default = "default_approval_expires_h")]
    pub expires_h: i64,
    #[serde(default = "default_approver_rbac_role")]
    pub approver_rbac_role: String,
    #[serde(default = "default_nl_approver_role")]
    pub nl_approver_role: String,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            expires_h: default_approval_expires_h(),
            approver_rbac_role: default_approver_rbac_role(),
            nl_approver_role: default_nl_approver_role(),
        }
    }
}

/// Filesystem roots for every JSONL-backed store (spec §6 path options).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorePaths {
    #[serde(default = "default_urg_store_path")]
    pub urg_store_path: PathBuf,
    #[serde(default = "default_audit_dir")]
    pub audit_dir: PathBuf,
    #[serde(default = "default_checkpoints_path")]
    pub checkpoints_path: PathBuf,
    #[serde(default = "default_state_store_path")]
    pub state_store_path: PathBuf,
    #[serde(default = "default_orch_events_path")]
    pub orch_events_path: PathBuf,
}

impl Default for StorePaths {
    fn default() -> Self {
        Self {
            urg_store_path: default_urg_store_path(),
            audit_dir: default_audit_dir(),
            checkpoints_path: default_checkpoints_path(),
            state_store_path: default_state_store_path(),
            orch_events_path: default_orch_events_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoscalerSettings {
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_target_queue_depth")]
    pub target_queue_depth: usize,
    #[serde(default = "default_target_p95_latency_ms")]
    pub target_p95_latency_ms: f64,
    #[serde(default = "default_scale_up_step")]
    pub scale_up_step: usize,
    #[serde(default = "default_scale_down_step")]
    pub scale_down_step: usize,
    #[serde(default = "default_scale_decision_interval_ms")]
    pub scale_decision_interval_ms: u64,
    #[serde(default = "default_worker_shutdown_timeout_s")]
    pub worker_shutdown_timeout_s: u64,
}

impl Default for AutoscalerSettings {
    fn default() -> Self {
        Self {
            min_workers: default_min_workers(),
            max_workers: default_max_workers(),
            target_queue_depth: default_target_queue_depth(),
            target_p95_latency_ms: default_target_p95_latency_ms(),
            scale_up_step: default_scale_up_step(),
            scale_down_step: default_scale_down_step(),
            scale_decision_interval_ms: default_scale_decision_interval_ms(),
            worker_shutdown_timeout_s: default_worker_shutdown_timeout_s(),
        }
    }
}

/// Root configuration, loaded by `ConfigLoader::load` from defaults +
/// optional YAML file + `ORCH_`-prefixed environment variables, matching
/// every option spec §6 names.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub paths: StorePaths,
    #[serde(default)]
    pub autoscaler: AutoscalerSettings,
    #[serde(default)]
    pub logging: crate::infrastructure::logging::LogConfig,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_visibility_ms() -> u64 {
    30_000
}
fn default_heartbeat_ms() -> u64 {
    10_000
}
fn default_max_job_retries() -> u32 {
    5
}
fn default_requeue_base_ms() -> u64 {
    500
}
fn default_requeue_cap_ms() -> u64 {
    60_000
}
fn default_requeue_jitter_pct() -> f64 {
    0.2
}
fn default_rate_limit_capacity() -> u32 {
    100
}
fn default_rate_limit_refill() -> u32 {
    50
}
fn default_rate_limit_retry_delay_ms() -> u64 {
    1_000
}
fn default_approval_expires_h() -> i64 {
    72
}
fn default_approver_rbac_role() -> String {
    "operator".to_string()
}
fn default_nl_approver_role() -> String {
    "operator".to_string()
}
fn default_urg_store_path() -> PathBuf {
    PathBuf::from("data/urg")
}
fn default_audit_dir() -> PathBuf {
    PathBuf::from("data/audit")
}
fn default_checkpoints_path() -> PathBuf {
    PathBuf::from("data/checkpoints.jsonl")
}
fn default_state_store_path() -> PathBuf {
    PathBuf::from("data/resume.jsonl")
}
fn default_orch_events_path() -> PathBuf {
    PathBuf::from("data/events.jsonl")
}
fn default_min_workers() -> usize {
    1
}
fn default_max_workers() -> usize {
    12
}
fn default_target_queue_depth() -> usize {
    50
}
fn default_target_p95_latency_ms() -> f64 {
    2_000.0
}
fn default_scale_up_step() -> usize {
    2
}
fn default_scale_down_step() -> usize {
    1
}
fn default_scale_decision_interval_ms() -> u64 {
    15_000
}
fn default_worker_shutdown_timeout_s() -> u64 {
    30
}
