#![allow(dead_code)]

pub mod app;
pub mod scripts;

use public_exporter::{CollectorManager, ProcessRunner, Registry};
use public_exporter::internal_metrics::Metrics;
use std::sync::Arc;
use std::time::Duration;

/// A manager backed by real processes and a metrics handle that records nothing.
pub fn process_manager() -> CollectorManager {
    CollectorManager::new(
        Arc::new(ProcessRunner::new()),
        Registry::new(),
        Arc::new(Metrics::new_for_test()),
    )
    .with_shutdown_grace(Duration::from_secs(2))
}

/// Polls `check` every 20ms until it returns true or `within` elapses.
pub async fn eventually(within: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
