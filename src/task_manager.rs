//! Manages the lifecycle of spawned collector tasks.
use crate::error::ShutdownError;
use futures::future::join_all;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Stand-in deadline when `now + deadline` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// A centralized manager for spawned tasks.
///
/// This struct is responsible for:
/// - Spawning tasks and keeping track of their `JoinHandle`s under a name.
/// - Owning the shutdown signal every task subscribes to.
/// - Joining all tasks within a deadline, aborting the ones that overrun.
#[derive(Clone, Debug)]
pub struct TaskManager {
    handles: Arc<Mutex<Vec<(String, JoinHandle<()>)>>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            handles: Arc::new(Mutex::new(Vec::new())),
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// Spawns a new task and adds its handle to the manager.
    pub fn spawn<F>(&self, name: impl Into<String>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        debug!(task_name = %name, "Spawning task");
        let handle = tokio::spawn(future);
        self.lock_handles().push((name, handle));
    }

    /// Returns a receiver that observes the shutdown signal.
    pub fn get_shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    #[cfg(test)]
    fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Number of tasks not yet joined.
    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock_handles().len()
    }

    /// Signals shutdown and waits up to `deadline` for every managed task.
    ///
    /// Tasks still running at the deadline are aborted and reported in
    /// `ShutdownError::Timeout`. Calling this again after it returned joins
    /// nothing and returns `Ok(())`.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), ShutdownError> {
        self.shutdown_tx.send_replace(true);

        let handles = self.lock_handles().drain(..).collect::<Vec<_>>();
        if handles.is_empty() {
            return Ok(());
        }
        info!(
            "TaskManager shutting down. Waiting for {} tasks to complete...",
            handles.len()
        );

        let now = Instant::now();
        let deadline_at = now.checked_add(deadline).unwrap_or(now + FAR_FUTURE);
        let mut panicked = Vec::new();
        let mut overrun = Vec::new();

        for (task_name, mut handle) in handles {
            let joined = tokio::time::timeout_at(deadline_at, &mut handle).await;
            match joined {
                Ok(Ok(())) => {
                    debug!(task_name = %task_name, "Task shut down gracefully.");
                }
                Ok(Err(e)) if e.is_panic() => {
                    error!(task_name = %task_name, "Task panicked during shutdown.");
                    panicked.push(task_name);
                }
                Ok(Err(_)) => {
                    debug!(task_name = %task_name, "Task was cancelled.");
                }
                Err(_) => {
                    warn!(task_name = %task_name, "Task did not stop before the deadline, aborting.");
                    handle.abort();
                    overrun.push((task_name, handle));
                }
            }
        }

        if !overrun.is_empty() {
            let (pending, aborted): (Vec<_>, Vec<_>) = overrun.into_iter().unzip();
            // Aborted tasks are joined so none of them can still write afterwards.
            join_all(aborted).await;
            error!(
                "{} tasks did not shut down within {:?}: {:?}",
                pending.len(),
                deadline,
                pending
            );
            return Err(ShutdownError::Timeout {
                timeout_secs: deadline.as_secs(),
                pending,
            });
        }

        if !panicked.is_empty() {
            error!("{} tasks panicked during shutdown: {:?}", panicked.len(), panicked);
            return Err(ShutdownError::Panicked(panicked));
        }

        info!("All tasks shut down gracefully.");
        Ok(())
    }

    fn lock_handles(&self) -> std::sync::MutexGuard<'_, Vec<(String, JoinHandle<()>)>> {
        match self.handles.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_joins_cooperative_tasks() {
        let manager = TaskManager::new();
        for i in 0..3 {
            let mut shutdown_rx = manager.get_shutdown_rx();
            manager.spawn(format!("worker-{}", i), async move {
                let _ = shutdown_rx.changed().await;
            });
        }
        assert_eq!(manager.len(), 3);

        manager.shutdown(Duration::from_secs(1)).await.unwrap();
        assert_eq!(manager.len(), 0);
        assert!(manager.is_shutting_down());
        // Second call has nothing left to join.
        manager.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_reports_and_aborts_overrunning_tasks() {
        let manager = TaskManager::new();
        manager.spawn("stubborn", async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let mut shutdown_rx = manager.get_shutdown_rx();
        manager.spawn("polite", async move {
            let _ = shutdown_rx.changed().await;
        });

        let err = manager.shutdown(Duration::from_secs(2)).await.unwrap_err();
        assert_eq!(
            err,
            ShutdownError::Timeout {
                timeout_secs: 2,
                pending: vec!["stubborn".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn test_shutdown_with_unrepresentable_deadline() {
        let manager = TaskManager::new();
        let mut shutdown_rx = manager.get_shutdown_rx();
        manager.spawn("worker", async move {
            let _ = shutdown_rx.changed().await;
        });

        manager.shutdown(Duration::MAX).await.unwrap();
        assert_eq!(manager.len(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_reports_panics() {
        let manager = TaskManager::new();
        manager.spawn("panicky", async {
            panic!("boom");
        });

        let err = manager.shutdown(Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err, ShutdownError::Panicked(vec!["panicky".to_string()]));
    }
}
