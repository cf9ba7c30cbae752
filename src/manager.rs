//! Owns the set of collector tasks and their coordinated shutdown.

use crate::{
    core::{CollectorKey, CollectorSnapshot, CollectorSpec, ScriptRunner},
    error::{ShutdownError, StartError},
    internal_metrics::Metrics,
    registry::Registry,
    task::{CollectorTask, TaskState},
    task_manager::TaskManager,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, instrument};

const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Started,
    Stopped,
}

struct Inner {
    phase: Phase,
    tasks: Vec<(CollectorKey, watch::Receiver<TaskState>)>,
    max_timeout: Duration,
}

/// Starts one task per collector and stops them all together.
///
/// The manager does no per-tick work. Results flow from each task straight
/// into the `Registry` it was built with, and readers go through
/// `snapshot()` and `active_count()`.
pub struct CollectorManager {
    registry: Registry,
    runner: Arc<dyn ScriptRunner>,
    metrics: Arc<Metrics>,
    task_manager: TaskManager,
    shutdown_grace: Duration,
    inner: Mutex<Inner>,
    stop_lock: tokio::sync::Mutex<()>,
}

impl CollectorManager {
    pub fn new(runner: Arc<dyn ScriptRunner>, registry: Registry, metrics: Arc<Metrics>) -> Self {
        Self {
            registry,
            runner,
            metrics,
            task_manager: TaskManager::new(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                tasks: Vec::new(),
                max_timeout: Duration::ZERO,
            }),
            stop_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Time allowed on top of the longest collector timeout when stopping.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Spawns one task per enabled spec and returns without waiting on them.
    ///
    /// Must be called from within a Tokio runtime. Specs that fail validation
    /// still get a task, which logs the problem and stops at once; they never
    /// affect the other collectors.
    #[instrument(skip_all)]
    pub fn start<I>(&self, specs: I) -> Result<(), StartError>
    where
        I: IntoIterator<Item = (CollectorKey, CollectorSpec)>,
    {
        let mut inner = self.lock_inner();
        match inner.phase {
            Phase::Started => return Err(StartError::AlreadyStarted),
            Phase::Stopped => return Err(StartError::Stopped),
            Phase::Idle => {}
        }
        inner.phase = Phase::Started;

        for (key, spec) in specs {
            if !spec.enabled {
                info!(collector = %key, "Collector is disabled, skipping...");
                continue;
            }
            if spec.validate().is_ok() {
                inner.max_timeout = inner.max_timeout.max(spec.timeout());
            }

            let (task, state_rx) = CollectorTask::new(
                key.clone(),
                spec,
                self.runner.clone(),
                self.registry.slot(&key),
                self.metrics.clone(),
            );
            self.task_manager
                .spawn(key.to_string(), task.run(self.task_manager.get_shutdown_rx()));
            inner.tasks.push((key, state_rx));
        }

        info!("Started {} collector tasks", inner.tasks.len());
        Ok(())
    }

    /// Signals every task to stop and waits until all of them have.
    ///
    /// Waits at most the longest collector timeout plus the shutdown grace;
    /// tasks still running after that are aborted and named in the error.
    /// Once a call has returned, later calls do nothing.
    pub async fn stop(&self) -> Result<(), ShutdownError> {
        let _guard = self.stop_lock.lock().await;
        let deadline = {
            let mut inner = self.lock_inner();
            inner.phase = Phase::Stopped;
            inner.max_timeout.saturating_add(self.shutdown_grace)
        };
        self.task_manager.shutdown(deadline).await
    }

    /// Latest snapshot of every collector that has run at least once.
    pub fn snapshot(&self) -> Vec<(CollectorKey, Arc<CollectorSnapshot>)> {
        self.registry.read_all()
    }

    /// Number of collectors that have reported at least once.
    pub fn active_count(&self) -> usize {
        self.registry.count()
    }

    /// True when every reported collector is healthy.
    pub fn is_healthy(&self) -> bool {
        self.snapshot().iter().all(|(_, snapshot)| snapshot.healthy)
    }

    /// Current lifecycle state of every spawned task.
    pub fn task_states(&self) -> Vec<(CollectorKey, TaskState)> {
        self.lock_inner()
            .tasks
            .iter()
            .map(|(key, rx)| (key.clone(), *rx.borrow()))
            .collect()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
