//! Hierarchical config loading, grounded on the teacher's
//! `infrastructure::config::ConfigLoader`: programmatic defaults, an
//! optional YAML file, then `ORCH_`-prefixed environment variables,
//! highest precedence last.

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use super::Config;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid min_workers/max_workers: min={0} must be <= max={1}")]
    InvalidWorkerBounds(usize, usize),

    #[error("invalid scale_decision_interval_ms: {0}, must be positive")]
    InvalidScaleInterval(u64),

    #[error("invalid requeue backoff: base_ms ({0}) must be <= cap_ms ({1})")]
    InvalidBackoffBounds(u64, u64),

    #[error("invalid requeue_jitter_pct: {0}, must be in [0, 1]")]
    InvalidJitterPct(f64),

    #[error("invalid approval_expires_h: {0}, must be positive")]
    InvalidApprovalExpiry(i64),

    #[error("failed to extract configuration: {0}")]
    Extraction(String),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from defaults, an optional `config.yaml` in the working
    /// directory, then `ORCH_*` environment variables (nested fields
    /// addressed with `__`, e.g. `ORCH_QUEUE__BACKEND=redis`).
    pub fn load() -> Result<Config, ConfigError> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("config.yaml"))
            .merge(Env::prefixed("ORCH_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Extraction(e.to_string()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config, ConfigError> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("ORCH_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Extraction(e.to_string()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.autoscaler.min_workers > config.autoscaler.max_workers {
            return Err(ConfigError::InvalidWorkerBounds(config.autoscaler.min_workers, config.autoscaler.max_workers));
        }
        if config.autoscaler.scale_decision_interval_ms == 0 {
            return Err(ConfigError::InvalidScaleInterval(config.autoscaler.scale_decision_interval_ms));
        }
        if config.retry.requeue_base_ms > config.retry.requeue_cap_ms {
            return Err(ConfigError::InvalidBackoffBounds(config.retry.requeue_base_ms, config.retry.requeue_cap_ms));
        }
        if !(0.0..=1.0).contains(&config.retry.requeue_jitter_pct) {
            return Err(ConfigError::InvalidJitterPct(config.retry.requeue_jitter_pct));
        }
        if config.approval.expires_h <= 0 {
            return Err(ConfigError::InvalidApprovalExpiry(config.approval.expires_h));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        ConfigLoader::validate(&config).expect("default config should be valid");
    }

    #[test]
    fn rejects_inverted_worker_bounds() {
        let mut config = Config::default();
        config.autoscaler.min_workers = 10;
        config.autoscaler.max_workers = 2;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidWorkerBounds(10, 2))));
    }

    #[test]
    fn rejects_backoff_base_above_cap() {
        let mut config = Config::default();
        config.retry.requeue_base_ms = 10_000;
        config.retry.requeue_cap_ms = 1_000;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidBackoffBounds(10_000, 1_000))));
    }

    #[test]
    fn rejects_jitter_outside_unit_interval() {
        let mut config = Config::default();
        config.retry.requeue_jitter_pct = 1.5;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidJitterPct(_))));
    }

    #[test]
    fn env_override_takes_precedence_over_defaults() {
        temp_env::with_var("ORCH_QUEUE__BACKEND", Some("redis"), || {
            let config = ConfigLoader::load().expect("load should succeed");
            assert_eq!(config.queue.backend, crate::infrastructure::config::QueueBackend::Redis);
        });
    }
}
