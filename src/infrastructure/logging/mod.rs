//! Structured logging setup (ambient stack, spec §9 observability note).
//! Grounded on the teacher's `infrastructure::logging` split: a
//! `LogConfig` struct plus a `Logger` that wires `tracing-subscriber`
//! layers, simplified to the one output shape this crate needs (no
//! per-environment rotation policy selection beyond daily/hourly/never).

mod logger;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use logger::Logger;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    Daily,
    Hourly,
    Never,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::Daily
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default = "default_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub enable_stdout: bool,
    #[serde(default)]
    pub rotation: RotationPolicy,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
            log_dir: None,
            enable_stdout: true,
            rotation: RotationPolicy::default(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_format() -> LogFormat {
    LogFormat::Json
}
fn default_true() -> bool {
    true
}
