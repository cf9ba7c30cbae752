#![allow(dead_code)]
//! Test helpers for running the full application instance.

use anyhow::Result;
use public_exporter::{
    app::App,
    config::{ClusterConfig, CollectorConfig, Config},
    internal_metrics::Metrics,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::{net::TcpListener, sync::watch, task::JoinHandle, time::timeout};

/// Represents a running instance of the application for testing purposes.
pub struct TestApp {
    pub shutdown_tx: watch::Sender<bool>,
    pub app_handle: JoinHandle<Result<()>>,
    addr: SocketAddr,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Shuts down the application and waits for it to terminate.
    /// Fails if the application does not shut down within the specified timeout.
    pub async fn shutdown(self, timeout_duration: Duration) -> Result<()> {
        self.shutdown_tx.send_replace(true);

        match timeout(timeout_duration, self.app_handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(anyhow::anyhow!("App failed to shut down within the timeout")),
        }
    }
}

/// A builder for creating `TestApp` instances with specific configurations.
pub struct TestAppBuilder {
    pub config: Config,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.global.http_timeout = 5;
        config.global.shutdown_grace = 2;
        Self { config }
    }

    /// Adds an enabled shell collector to an enabled cluster.
    pub fn with_collector(mut self, cluster: &str, name: &str, script_path: &str, interval: u64, timeout: u64) -> Self {
        let cluster = self
            .config
            .clusters
            .entry(cluster.to_string())
            .or_insert_with(|| ClusterConfig {
                enabled: true,
                ..Default::default()
            });
        cluster.collectors.insert(
            name.to_string(),
            CollectorConfig {
                enabled: true,
                interval: Some(interval),
                timeout: Some(timeout),
                script_path: script_path.to_string(),
                script_type: "shell".to_string(),
            },
        );
        self
    }

    pub fn with_config_modifier(mut self, modifier: impl FnOnce(&mut Config)) -> Self {
        modifier(&mut self.config);
        self
    }

    /// Builds the application on an ephemeral port and runs it in the background.
    pub async fn build(self) -> Result<TestApp> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let app = App::builder(self.config)
            .listener_override(listener)
            .metrics_override(Metrics::new_for_test())
            .build(shutdown_rx)
            .await?;
        let addr = app.local_addr();
        let app_handle = tokio::spawn(app.run());

        Ok(TestApp {
            shutdown_tx,
            app_handle,
            addr,
        })
    }
}
