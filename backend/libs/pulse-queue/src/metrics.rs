//! Queue metrics for observability

use prometheus::{CounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<QueueMetricsInner> = OnceLock::new();

struct QueueMetricsInner {
    processed: CounterVec,
    retried: CounterVec,
    dead_lettered: CounterVec,
    permanent_failures: CounterVec,
    malformed: CounterVec,
}

impl QueueMetricsInner {
    fn new() -> Self {
        Self {
            processed: CounterVec::new(
                Opts::new("pulse_queue_jobs_processed_total", "Jobs completed"),
                &["queue"],
            )
            .expect("valid metric definition"),
            retried: CounterVec::new(
                Opts::new("pulse_queue_jobs_retried_total", "Jobs scheduled for retry"),
                &["queue"],
            )
            .expect("valid metric definition"),
            dead_lettered: CounterVec::new(
                Opts::new(
                    "pulse_queue_jobs_dead_lettered_total",
                    "Jobs moved to the dead-letter stream",
                ),
                &["queue"],
            )
            .expect("valid metric definition"),
            permanent_failures: CounterVec::new(
                Opts::new(
                    "pulse_queue_jobs_permanent_failures_total",
                    "Jobs completed as logged no-op failures",
                ),
                &["queue"],
            )
            .expect("valid metric definition"),
            malformed: CounterVec::new(
                Opts::new(
                    "pulse_queue_jobs_malformed_total",
                    "Stream entries that could not be decoded",
                ),
                &["queue"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.processed.clone()))?;
        registry.register(Box::new(self.retried.clone()))?;
        registry.register(Box::new(self.dead_lettered.clone()))?;
        registry.register(Box::new(self.permanent_failures.clone()))?;
        registry.register(Box::new(self.malformed.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static QueueMetricsInner {
    METRICS.get_or_init(QueueMetricsInner::new)
}

/// Queue metrics wrapper
#[derive(Clone, Default)]
pub struct QueueMetrics;

impl QueueMetrics {
    pub fn new() -> Self {
        Self
    }

    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_processed(&self, queue: &str) {
        get_metrics().processed.with_label_values(&[queue]).inc();
    }

    pub fn record_retried(&self, queue: &str) {
        get_metrics().retried.with_label_values(&[queue]).inc();
    }

    pub fn record_dead_lettered(&self, queue: &str) {
        get_metrics()
            .dead_lettered
            .with_label_values(&[queue])
            .inc();
    }

    pub fn record_permanent_failure(&self, queue: &str) {
        get_metrics()
            .permanent_failures
            .with_label_values(&[queue])
            .inc();
    }

    pub fn record_malformed(&self, queue: &str) {
        get_metrics().malformed.with_label_values(&[queue]).inc();
    }
}
