//! Integration tests for graceful shutdown.

use anyhow::Result;
use std::time::Duration;

mod helpers;
use helpers::{app::TestAppBuilder, scripts::ScriptDir};

/// Runs the whole application and asserts it terminates within a strict time
/// limit after the shutdown signal, even with a script mid-execution.
#[tokio::test]
async fn test_app_shuts_down_within_timeout() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let scripts = ScriptDir::new();
    let slow = scripts.shell("slow.sh", "sleep 1\necho slow 1");
    let fast = scripts.shell("fast.sh", "echo fast 1");

    let app = TestAppBuilder::new()
        .with_collector("prod", "slow", &slow.to_string_lossy(), 1, 3)
        .with_collector("prod", "fast", &fast.to_string_lossy(), 1, 3)
        .build()
        .await?;

    tokio::time::sleep(Duration::from_millis(500)).await;

    app.shutdown(Duration::from_secs(6)).await?;
    Ok(())
}

/// The HTTP listener is released once the app has shut down.
#[tokio::test]
async fn test_server_stops_accepting_after_shutdown() -> Result<()> {
    let app = TestAppBuilder::new()
        .with_config_modifier(|config| {
            config.clusters.insert("empty".to_string(), Default::default());
        })
        .build()
        .await?;
    let url = app.url("/health");
    assert!(reqwest::get(&url).await?.status().is_success());

    app.shutdown(Duration::from_secs(5)).await?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(1))
        .build()?;
    assert!(client.get(&url).send().await.is_err());
    Ok(())
}
