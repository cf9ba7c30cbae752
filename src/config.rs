//! Configuration management for the exporter
//!
//! This module defines the main `Config` struct and its sub-structs. It uses
//! the `figment` crate to layer built-in defaults, the configuration file
//! (YAML or TOML), `PUBLIC_EXPORTER_` environment variables and command-line
//! overrides.

use crate::cli::Cli;
use crate::core::{CollectorKey, CollectorSpec};
use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// Process-wide settings.
    pub global: GlobalConfig,
    /// Exporter self-metrics.
    pub metrics: MetricsConfig,
    /// Clusters keyed by name.
    #[serde(default)]
    pub clusters: BTreeMap<String, ClusterConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GlobalConfig {
    /// Interval in seconds for collectors that do not set one.
    pub default_scrape_interval: u64,
    /// Timeout in seconds for collectors that do not set one.
    pub default_timeout: u64,
    /// Address the HTTP server binds to.
    pub listen_address: SocketAddr,
    /// Per-request timeout of the HTTP server, in seconds.
    pub http_timeout: u64,
    /// Extra seconds granted on shutdown beyond the longest collector timeout.
    pub shutdown_grace: u64,
    /// Older layout of `log_level`; takes precedence over the top-level key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// Older layout of the listen port; replaces the port of `listen_address`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_port: Option<u16>,
    /// File logging settings of older configurations. Accepted but unused:
    /// logs always go to stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_max_age: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_rotation_time: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MetricsConfig {
    /// Append the exporter's own metrics to `/metrics`.
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct ClusterConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub collectors: BTreeMap<String, CollectorConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct CollectorConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Seconds between executions; falls back to `global.default_scrape_interval`.
    #[serde(default)]
    pub interval: Option<u64>,
    /// Seconds before a run is killed; falls back to `global.default_timeout`.
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub script_path: String,
    #[serde(default)]
    pub script_type: String,
}

impl Config {
    /// Loads the application configuration, layering defaults, the config
    /// file, environment variables and command-line arguments.
    pub fn load(cli: &Cli) -> Result<Self> {
        let path = cli
            .config_file
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.into());
        if !path.exists() {
            bail!("configuration file {} not found", path.display());
        }

        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        let figment = if is_yaml(&path) {
            figment.merge(Yaml::file(&path))
        } else {
            figment.merge(Toml::file(&path))
        };
        let mut config: Config = figment
            // e.g. PUBLIC_EXPORTER_GLOBAL__HTTP_TIMEOUT=10
            .merge(Env::prefixed("PUBLIC_EXPORTER_").split("__"))
            .merge(cli)
            .extract()
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.apply_global_overrides(cli);

        config
            .validate()
            .context("configuration validation failed")?;
        Ok(config)
    }

    /// Folds the older `global.log_level`/`global.http_port` keys into the
    /// current fields. Explicit command-line flags still win.
    fn apply_global_overrides(&mut self, cli: &Cli) {
        if let Some(level) = self.global.log_level.take() {
            if cli.log_level.is_none() {
                self.log_level = level;
            }
        }
        if let Some(port) = self.global.http_port.take() {
            if cli.listen_address.is_none() {
                self.global.listen_address.set_port(port);
            }
        }
    }

    /// True when the file carries the older file-logging settings.
    pub fn has_file_logging_settings(&self) -> bool {
        self.global.log_file.is_some()
            || self.global.log_max_age.is_some()
            || self.global.log_rotation_time.is_some()
    }

    /// Rejects settings that make the whole process unusable. Problems with a
    /// single collector are left to its task, which skips it.
    pub fn validate(&self) -> Result<()> {
        if self.global.default_scrape_interval == 0 {
            bail!("global.default_scrape_interval must be positive");
        }
        if self.global.default_timeout == 0 {
            bail!("global.default_timeout must be positive");
        }
        if self.global.http_timeout == 0 {
            bail!("global.http_timeout must be positive");
        }
        if self.clusters.is_empty() {
            bail!("at least one cluster must be configured");
        }
        Ok(())
    }

    /// Resolved specs for every enabled collector of every enabled cluster.
    pub fn collector_specs(&self) -> Vec<(CollectorKey, CollectorSpec)> {
        let mut specs = Vec::new();
        for (cluster_name, cluster) in &self.clusters {
            if !cluster.enabled {
                info!("Cluster {} is disabled, skipping...", cluster_name);
                continue;
            }
            for (collector_name, collector) in &cluster.collectors {
                if !collector.enabled {
                    info!(
                        "Collector {} in cluster {} is disabled, skipping...",
                        collector_name, cluster_name
                    );
                    continue;
                }
                specs.push((
                    CollectorKey::new(cluster_name.as_str(), collector_name.as_str()),
                    self.resolve(collector),
                ));
            }
        }
        specs
    }

    fn resolve(&self, collector: &CollectorConfig) -> CollectorSpec {
        let or_default = |value: Option<u64>, default: u64| value.filter(|v| *v > 0).unwrap_or(default);
        CollectorSpec {
            script_path: collector.script_path.clone(),
            script_type: collector.script_type.clone(),
            interval_seconds: or_default(collector.interval, self.global.default_scrape_interval),
            timeout_seconds: or_default(collector.timeout, self.global.default_timeout),
            enabled: collector.enabled,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.global.http_timeout)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.global.shutdown_grace)
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            global: GlobalConfig {
                default_scrape_interval: 60,
                default_timeout: 30,
                listen_address: SocketAddr::from(([0, 0, 0, 0], 5535)),
                http_timeout: 30,
                shutdown_grace: 5,
                log_level: None,
                http_port: None,
                log_file: None,
                log_max_age: None,
                log_rotation_time: None,
            },
            metrics: MetricsConfig { enabled: true },
            clusters: BTreeMap::new(),
        }
    }
}
