//! The main application logic, decoupled from the entry point.

use crate::{
    config::Config,
    core::ScriptRunner,
    internal_metrics::{Metrics, MetricsBuilder},
    manager::CollectorManager,
    registry::Registry,
    runner::ProcessRunner,
    server::{ExporterServer, ServerState},
};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

/// A handle to the running application.
pub struct App {
    manager: Arc<CollectorManager>,
    server_handle: JoinHandle<()>,
    local_addr: SocketAddr,
    shutdown_rx: watch::Receiver<bool>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The address the HTTP server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn manager(&self) -> Arc<CollectorManager> {
        self.manager.clone()
    }

    /// Waits for the shutdown signal, then stops the server and every collector.
    pub async fn run(mut self) -> Result<()> {
        while !*self.shutdown_rx.borrow_and_update() {
            if self.shutdown_rx.changed().await.is_err() {
                break;
            }
        }
        info!("Shutdown signal received. Stopping HTTP server and collectors...");

        if let Err(e) = self.server_handle.await {
            error!("HTTP server task panicked: {:?}", e);
        }

        self.manager
            .stop()
            .await
            .context("collectors did not shut down cleanly")?;

        info!("All collectors shut down.");
        Ok(())
    }
}

/// Builder for the main application.
///
/// Separates constructing the components from running them, and lets tests
/// swap in a fake runner or a pre-bound listener.
pub struct AppBuilder {
    config: Config,
    runner_override: Option<Arc<dyn ScriptRunner>>,
    listener_override: Option<TcpListener>,
    metrics_override: Option<Metrics>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            runner_override: None,
            listener_override: None,
            metrics_override: None,
        }
    }

    /// Overrides the script runner for testing.
    pub fn runner_override(mut self, runner: Arc<dyn ScriptRunner>) -> Self {
        self.runner_override = Some(runner);
        self
    }

    /// Serves on an already bound listener instead of `global.listen_address`.
    pub fn listener_override(mut self, listener: TcpListener) -> Self {
        self.listener_override = Some(listener);
        self
    }

    /// Overrides the metrics system; no Prometheus recorder is installed.
    pub fn metrics_override(mut self, metrics: Metrics) -> Self {
        self.metrics_override = Some(metrics);
        self
    }

    /// Starts the collectors and the HTTP server, returning a runnable `App`.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;

        // Bind first so a taken port fails before any collector starts.
        let listener = match self.listener_override {
            Some(listener) => listener,
            None => TcpListener::bind(config.global.listen_address)
                .await
                .with_context(|| format!("failed to bind {}", config.global.listen_address))?,
        };
        let local_addr = listener.local_addr()?;

        let (metrics, prom_handle) = match self.metrics_override {
            Some(m) => (m, None),
            None => MetricsBuilder::new(config.metrics.clone()).build(),
        };
        let metrics = Arc::new(metrics);

        let runner = self
            .runner_override
            .unwrap_or_else(|| Arc::new(ProcessRunner::new()) as Arc<dyn ScriptRunner>);

        let manager = Arc::new(
            CollectorManager::new(runner, Registry::new(), metrics)
                .with_shutdown_grace(config.shutdown_grace()),
        );
        let specs = config.collector_specs();
        debug!(collectors = specs.len(), "Starting collector manager");
        manager.start(specs)?;

        let server = ExporterServer::new(
            listener,
            ServerState {
                manager: manager.clone(),
                prom_handle,
            },
            config.http_timeout(),
            shutdown_rx.clone(),
        );
        let server_handle = tokio::spawn(server.run());

        info!("Exporter is running on http://{}/metrics", local_addr);

        Ok(App {
            manager,
            server_handle,
            local_addr,
            shutdown_rx,
        })
    }
}
