/// Public Exporter - runs collector scripts on a schedule and serves their
/// latest output to Prometheus.
///
/// This library provides the collector manager, the per-collector task loop,
/// the script runner and the HTTP surface that renders the cached results.
pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod internal_metrics;
pub mod manager;
pub mod registry;
pub mod runner;
pub mod server;
pub mod task;
pub mod task_manager;

// Re-export core types for convenience
pub use core::*;
pub use error::{ShutdownError, SpecError, StartError};
pub use manager::CollectorManager;
pub use registry::Registry;
pub use runner::ProcessRunner;
