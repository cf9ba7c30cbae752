//! # Internal Metrics Module
//!
//! Self-metrics of the exporter: how often each collector script ran, how it
//! ended and how long it took. They are recorded through the `metrics`
//! facade; when the Prometheus recorder is installed the HTTP surface appends
//! its rendering to `/metrics`.
//!
//! ## Components:
//!
//! - **`Metrics`**: cloneable handle with the recording helpers used by the
//!   collector tasks. Without an installed recorder every call is a no-op.
//!
//! - **`MetricsBuilder`**: installs the Prometheus recorder and returns the
//!   `PrometheusHandle` used for rendering.

use crate::config::MetricsConfig;
use crate::core::{CollectorKey, Outcome};
use log::error;
use metrics::Unit;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The public API for the metrics system.
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    running: Arc<AtomicUsize>,
}

impl Metrics {
    /// Creates a new `Metrics` instance and registers descriptions for all
    /// supported metrics with the global recorder.
    pub fn new() -> Self {
        metrics::describe_counter!(
            "collector_executions_total",
            Unit::Count,
            "Total number of collector script executions, labeled by outcome."
        );
        metrics::describe_histogram!(
            "collector_execution_duration_seconds",
            Unit::Seconds,
            "Wall-clock duration of collector script executions."
        );
        metrics::describe_gauge!(
            "collector_tasks_running",
            Unit::Count,
            "Number of collector tasks currently in the running state."
        );
        Self::default()
    }

    /// Creates a `Metrics` instance suitable for testing.
    ///
    /// No recorder is installed in unit tests, so the `metrics` macros fall
    /// through to the no-op recorder.
    pub fn new_for_test() -> Self {
        Self::new()
    }

    /// Records the outcome and duration of one script execution.
    pub fn record_execution(&self, key: &CollectorKey, outcome: &Outcome, elapsed: Duration) {
        metrics::counter!(
            "collector_executions_total",
            "cluster" => key.cluster.clone(),
            "collector" => key.collector.clone(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
        metrics::histogram!(
            "collector_execution_duration_seconds",
            "cluster" => key.cluster.clone(),
            "collector" => key.collector.clone()
        )
        .record(elapsed.as_secs_f64());
    }

    /// Counts a task as running until the returned guard is dropped, which
    /// also covers tasks that are aborted instead of stopping on their own.
    pub fn task_running(&self) -> RunningTaskGuard {
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::gauge!("collector_tasks_running").set(running as f64);
        RunningTaskGuard {
            running: self.running.clone(),
        }
    }

    /// Number of tasks currently holding a `RunningTaskGuard`.
    pub fn running_tasks(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct RunningTaskGuard {
    running: Arc<AtomicUsize>,
}

impl Drop for RunningTaskGuard {
    fn drop(&mut self) {
        let running = self.running.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::gauge!("collector_tasks_running").set(running as f64);
    }
}

/// Builder for the metrics system.
pub struct MetricsBuilder {
    config: MetricsConfig,
}

impl MetricsBuilder {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Installs the Prometheus recorder as the global recorder.
    ///
    /// Returns `None` for the handle when metrics are disabled or the
    /// recorder could not be installed; recording then stays a no-op.
    pub fn build(self) -> (Metrics, Option<PrometheusHandle>) {
        if !self.config.enabled {
            return (Metrics::new(), None);
        }

        let builder = match PrometheusBuilder::new().set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0],
        ) {
            Ok(builder) => builder,
            Err(e) => {
                error!("Failed to configure Prometheus buckets: {}", e);
                return (Metrics::new(), None);
            }
        };
        let recorder = builder.build_recorder();
        let handle = recorder.handle();

        if let Err(e) = metrics::set_global_recorder(recorder) {
            error!("Failed to install Prometheus recorder: {}", e);
            return (Metrics::new(), None);
        }

        (Metrics::new(), Some(handle))
    }
}
