//! The periodic loop for a single collector.

use crate::{
    core::{CollectorKey, CollectorSnapshot, CollectorSpec, Outcome, ScriptRunner},
    internal_metrics::Metrics,
    registry::SnapshotSlot,
};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

/// Lifecycle of a collector task. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Starting => "starting",
            TaskState::Running => "running",
            TaskState::Stopping => "stopping",
            TaskState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Owns one collector's spec and publishes its results into its registry slot.
///
/// Executions for one key are strictly sequential: a new tick is only taken
/// after the previous invocation and its publish have completed.
pub struct CollectorTask {
    key: CollectorKey,
    spec: CollectorSpec,
    runner: Arc<dyn ScriptRunner>,
    slot: SnapshotSlot,
    metrics: Arc<Metrics>,
    state_tx: watch::Sender<TaskState>,
}

impl CollectorTask {
    /// Creates a task in the `Starting` state and a receiver to observe it.
    pub fn new(
        key: CollectorKey,
        spec: CollectorSpec,
        runner: Arc<dyn ScriptRunner>,
        slot: SnapshotSlot,
        metrics: Arc<Metrics>,
    ) -> (Self, watch::Receiver<TaskState>) {
        let (state_tx, state_rx) = watch::channel(TaskState::Starting);
        let task = Self {
            key,
            spec,
            runner,
            slot,
            metrics,
            state_tx,
        };
        (task, state_rx)
    }

    /// Runs until the shutdown signal is observed, or returns at once if the
    /// spec is invalid.
    #[instrument(skip_all, fields(collector = %self.key))]
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        if let Err(e) = self.spec.validate() {
            warn!(
                script = %self.spec.script_path,
                error = %e,
                "Invalid collector configuration, collector will not run"
            );
            self.set_state(TaskState::Stopped);
            return;
        }

        self.set_state(TaskState::Running);
        let running = self.metrics.task_running();
        info!(
            interval_seconds = self.spec.interval_seconds,
            timeout_seconds = self.spec.timeout_seconds,
            "Starting collector"
        );

        // The first tick completes immediately.
        let mut ticker = tokio::time::interval(self.spec.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {}
            }

            let execution = self.execute_and_publish();
            tokio::pin!(execution);
            tokio::select! {
                biased;
                _ = &mut execution => {}
                _ = shutdown_rx.changed() => {
                    // In-flight scripts are never interrupted; the runner's
                    // timeout bounds how long this can take.
                    self.set_state(TaskState::Stopping);
                    debug!("Shutdown requested, waiting for in-flight script");
                    execution.await;
                    break;
                }
            }
        }

        self.set_state(TaskState::Stopping);
        drop(running);
        self.set_state(TaskState::Stopped);
        info!("Collector stopped");
    }

    async fn execute_and_publish(&self) {
        let result = self
            .runner
            .execute(&self.spec.script_path, &self.spec.script_type, self.spec.timeout())
            .await;
        self.metrics.record_execution(&self.key, &result.outcome, result.elapsed);

        match &result.outcome {
            Outcome::Success => {
                debug!(elapsed_ms = result.elapsed.as_millis() as u64, "Updated collector output");
            }
            failure => {
                warn!(
                    script = %self.spec.script_path,
                    error = %failure,
                    output = %result.output.trim(),
                    "Collector script failed"
                );
            }
        }

        self.slot
            .store(CollectorSnapshot::from_result(&self.key, &self.spec, &result));
    }

    fn set_state(&self, state: TaskState) {
        self.state_tx.send_replace(state);
    }
}
