//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged with
//! the configuration file and environment variables, taking precedence over
//! both.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Runs collector scripts on a schedule and serves their latest output to Prometheus.
#[derive(Parser, Debug, Default, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the YAML or TOML configuration file [default: config.yaml].
    #[arg(short, long, value_name = "FILE", alias = "config.file")]
    pub config_file: Option<PathBuf>,

    /// Logging level (trace, debug, info, warn, error).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Address for the HTTP server, e.g. 0.0.0.0:5535.
    #[arg(long, value_name = "ADDR")]
    pub listen_address: Option<SocketAddr>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        if let Some(addr) = self.listen_address {
            let mut global = Dict::new();
            global.insert("listen_address".into(), Value::from(addr.to_string()));
            dict.insert("global".into(), Value::from(global));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_legacy_config_flag() {
        let cli = Cli::parse_from(["public-exporter", "--config.file", "/app/config/config.yaml"]);
        assert_eq!(cli.config_file, Some(PathBuf::from("/app/config/config.yaml")));
    }

    #[test]
    fn test_provider_only_emits_given_overrides() {
        let cli = Cli::default();
        let data = cli.data().unwrap();
        assert!(data[&Profile::Default].is_empty());

        let cli = Cli::parse_from(["public-exporter", "--log-level", "debug", "--listen-address", "127.0.0.1:9000"]);
        let data = cli.data().unwrap();
        let dict = &data[&Profile::Default];
        assert_eq!(dict["log_level"].as_str(), Some("debug"));
        assert!(dict.contains_key("global"));
    }
}
