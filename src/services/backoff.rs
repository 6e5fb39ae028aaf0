//! Backoff & retry primitives (spec §4.A).
//!
//! Grounded on `original_source/.../retries.py`'s
//! `exponential_backoff_with_jitter` / `retry_with_backoff`, reshaped from a
//! Python decorator over arbitrary exceptions into a typed `Fault`
//! classification plus a generic async retry loop, per REDESIGN FLAGS
//! (typed results instead of exception-driven control flow).

use chrono::{DateTime, Utc};
use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};

use crate::domain::ports::errors::OrchestratorError;

/// Configuration mirroring the env-style options in spec §6
/// (`REQUEUE_BASE_MS`, `REQUEUE_CAP_MS`, `REQUEUE_JITTER_PCT`, `MAX_JOB_RETRIES`).
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub cap_ms: u64,
    pub jitter_pct: f64,
    pub max_retries: u32,
    pub max_total_time: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            cap_ms: 60_000,
            jitter_pct: 0.1,
            max_retries: 3,
            max_total_time: Duration::from_secs(300),
        }
    }
}

/// Classification of a failure, used to decide whether a retry is
/// warranted. Connector/handler code maps its own errors into this before
/// handing them to the retry loop or the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Transport-level error: timeout, connection reset, DNS failure.
    Transport,
    /// HTTP-style status code.
    Status(u16),
    /// Anything else — not retried.
    NonRetryable,
}

impl Fault {
    /// A fault is retryable iff it is a transport error or a status in
    /// {408, 429, 500, 502, 503, 504}.
    pub fn is_retryable(self) -> bool {
        match self {
            Self::Transport => true,
            Self::Status(code) => matches!(code, 408 | 429 | 500 | 502 | 503 | 504),
            Self::NonRetryable => false,
        }
    }
}

/// Pure delay computation: `min(cap, base * 2^attempt) * (1 +
/// uniform(-jitter, +jitter))`, clamped to be non-negative.
pub fn delay(attempt: u32, base_ms: u64, cap_ms: u64, jitter_pct: f64) -> Duration {
    let exp = base_ms.saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX).max(1));
    let capped = exp.min(cap_ms) as f64;

    let jitter_span = capped * jitter_pct;
    let jitter = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
    let with_jitter = (capped + jitter).max(0.0);

    Duration::from_millis(with_jitter.round() as u64)
}

/// Parse a `Retry-After` hint (either an integer count of seconds or an
/// RFC-1123 date) into a delay clamped to `[1, cap_ms]` milliseconds.
pub fn retry_after_override(header_value: &str, cap_ms: u64) -> Option<Duration> {
    if let Ok(seconds) = header_value.trim().parse::<u64>() {
        let ms = seconds.saturating_mul(1_000).clamp(1, cap_ms);
        return Some(Duration::from_millis(ms));
    }

    if let Ok(target) = DateTime::parse_from_rfc2822(header_value.trim()) {
        let now = Utc::now();
        let target_utc = target.with_timezone(&Utc);
        let secs = (target_utc - now).num_seconds().max(0) as u64;
        let ms = secs.saturating_mul(1_000).clamp(1, cap_ms);
        return Some(Duration::from_millis(ms));
    }

    None
}

/// Retry `task` up to `cfg.max_retries` additional times on a retryable
/// fault, sleeping the computed backoff delay between attempts, and
/// enforcing a `max_total_time` guard. Returns the last error if every
/// attempt fails.
pub async fn retry_with_backoff<T, Fut, F>(
    mut task: F,
    cfg: BackoffConfig,
    classify: impl Fn(&OrchestratorError) -> Fault,
) -> Result<T, OrchestratorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OrchestratorError>>,
{
    let start = Instant::now();
    let mut last_err: Option<OrchestratorError> = None;

    for attempt in 0..=cfg.max_retries {
        match task().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let fault = classify(&err);
                let exhausted = attempt == cfg.max_retries;
                let over_budget = start.elapsed() >= cfg.max_total_time;

                if !fault.is_retryable() || exhausted || over_budget {
                    return Err(err);
                }

                let wait = delay(attempt, cfg.base_ms, cfg.cap_ms, cfg.jitter_pct);
                last_err = Some(err);
                tokio::time::sleep(wait).await;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| OrchestratorError::fatal("retry loop exited without a result")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_is_bounded_by_cap_and_jitter() {
        for attempt in 0..10 {
            let d = delay(attempt, 1_000, 10_000, 0.2);
            assert!(d.as_millis() as f64 <= 10_000.0 * 1.2 + 1.0);
        }
    }

    #[test]
    fn retry_after_seconds_is_clamped_to_cap() {
        let d = retry_after_override("5", 2_000).unwrap();
        assert_eq!(d.as_millis(), 2_000);
    }

    #[tokio::test]
    async fn retry_with_backoff_stops_after_max_retries() {
        let attempts = AtomicU32::new(0);
        let cfg = BackoffConfig {
            base_ms: 1,
            cap_ms: 2,
            jitter_pct: 0.0,
            max_retries: 2,
            max_total_time: Duration::from_secs(5),
        };

        let result: Result<(), OrchestratorError> = retry_with_backoff(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(OrchestratorError::retryable("boom")) }
            },
            cfg,
            |_| Fault::Transport,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
