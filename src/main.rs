//! Public Exporter - scheduled collector scripts behind a Prometheus endpoint.

use anyhow::Result;
use clap::Parser;
use log::{error, info, warn};
use public_exporter::{app::App, cli::Cli, config::Config};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = Config::load(&cli).unwrap_or_else(|err| {
        env_logger::init();
        error!("Failed to load configuration: {:#}", err);
        std::process::exit(1);
    });

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Public Exporter starting up...");
    if config.has_file_logging_settings() {
        warn!("global.log_file, log_max_age and log_rotation_time are ignored; logs are written to stderr");
    }

    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Listen Address: {}", config.global.listen_address);
    info!("Default Scrape Interval: {}s", config.global.default_scrape_interval);
    info!("Default Timeout: {}s", config.global.default_timeout);
    info!("HTTP Timeout: {}s", config.global.http_timeout);
    info!("Shutdown Grace: {}s", config.global.shutdown_grace);
    info!(
        "Self Metrics: {}",
        if config.metrics.enabled { "Enabled" } else { "Disabled" }
    );
    for (name, cluster) in &config.clusters {
        info!(
            "Cluster {}: {} ({} collectors)",
            name,
            if cluster.enabled { "enabled" } else { "disabled" },
            cluster.collectors.len()
        );
    }
    info!("-------------------------------------------------------");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = App::builder(config).build(shutdown_rx).await?;

    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received. Shutting down gracefully...");
        shutdown_tx.send_replace(true);
    });

    app.run().await?;
    info!("All tasks shut down. Exiting.");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
            return;
        }
    };
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
        }
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
}
