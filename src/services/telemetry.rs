//! Telemetry façade (spec §4.O): counters/histograms/timers that no-op by
//! default, so a missing metrics backend never affects correctness or
//! latency. Generalizes the teacher's "instrumentation that's safe
//! without a subscriber" style (`tracing` spans across `services/*.rs`,
//! harmless with no layer installed) into an explicit type, since the
//! spec requires the no-op to hold structurally rather than depend on
//! whether a subscriber happens to be wired.

use std::sync::Arc;
use std::time::Instant;

/// Receives metric observations. The default `NoopSink` discards
/// everything; a real backend (Prometheus, OTLP, ...) implements this and
/// is handed to `Telemetry::new` at startup.
pub trait MetricsSink: Send + Sync {
    fn counter(&self, name: &str, value: u64, labels: &[(&str, &str)]);
    fn histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]);
}

#[derive(Debug, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn counter(&self, _name: &str, _value: u64, _labels: &[(&str, &str)]) {}
    fn histogram(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}
}

/// Thin façade every service holds by `Arc` and calls through
/// unconditionally; with the default sink every call is a few no-op
/// trait-object dispatches.
#[derive(Clone)]
pub struct Telemetry {
    sink: Arc<dyn MetricsSink>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self { sink: Arc::new(NoopSink) }
    }
}

impl Telemetry {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink }
    }

    pub fn incr(&self, name: &str, labels: &[(&str, &str)]) {
        self.sink.counter(name, 1, labels);
    }

    pub fn observe(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        self.sink.histogram(name, value, labels);
    }

    /// Start a timer; call `.stop()` on the guard (or let it drop) to
    /// record elapsed seconds under `name`, even on an early return or a
    /// panic unwind through the call site.
    pub fn timer(&self, name: &str) -> Timer<'_> {
        Timer {
            telemetry: self,
            name: name.to_string(),
            start: Instant::now(),
            recorded: false,
        }
    }
}

pub struct Timer<'a> {
    telemetry: &'a Telemetry,
    name: String,
    start: Instant,
    recorded: bool,
}

impl Timer<'_> {
    /// Elapsed seconds since the timer was created.
    pub fn elapsed_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn stop(mut self) -> f64 {
        let elapsed = self.elapsed_seconds();
        self.telemetry.observe(&self.name, elapsed, &[]);
        self.recorded = true;
        elapsed
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            let elapsed = self.elapsed_seconds();
            self.telemetry.observe(&self.name, elapsed, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        counters: Mutex<Vec<(String, u64)>>,
        histograms: AtomicU64,
    }

    impl MetricsSink for RecordingSink {
        fn counter(&self, name: &str, value: u64, _labels: &[(&str, &str)]) {
            self.counters.lock().unwrap().push((name.to_string(), value));
        }
        fn histogram(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {
            self.histograms.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_sink_never_panics() {
        let telemetry = Telemetry::default();
        telemetry.incr("jobs_processed", &[("tenant", "a")]);
        telemetry.observe("latency_ms", 12.5, &[]);
        let _ = telemetry.timer("dag_run").stop();
    }

    #[test]
    fn timer_records_even_without_explicit_stop() {
        let sink = Arc::new(RecordingSink::default());
        let telemetry = Telemetry::new(sink.clone());
        {
            let _timer = telemetry.timer("task_duration");
        }
        assert_eq!(sink.histograms.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn counter_forwards_to_sink() {
        let sink = Arc::new(RecordingSink::default());
        let telemetry = Telemetry::new(sink.clone());
        telemetry.incr("checkpoints_approved", &[]);
        assert_eq!(sink.counters.lock().unwrap()[0], ("checkpoints_approved".to_string(), 1));
    }
}
