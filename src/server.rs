//! # Exporter HTTP Server
//!
//! An `axum` server that renders the collector manager's cached state for a
//! Prometheus scraper and for health probes:
//!
//! - `/metrics` concatenates every collector's latest output, one health
//!   gauge per collector, the global health gauge, the collector count and,
//!   when installed, the exporter's own metrics.
//! - `/health` returns the same health view as JSON.
//! - `/` is a small index page.
//!
//! The server stops when the shared shutdown signal flips to `true`.

use crate::manager::CollectorManager;
use axum::{
    extract::State,
    http::header,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use log::error;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::trace;

const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared state for the request handlers.
#[derive(Clone)]
pub struct ServerState {
    pub manager: Arc<CollectorManager>,
    pub prom_handle: Option<PrometheusHandle>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    collectors: BTreeMap<String, &'static str>,
}

pub struct ExporterServer {
    listener: TcpListener,
    state: ServerState,
    http_timeout: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl ExporterServer {
    /// Creates a new `ExporterServer` on an already bound listener but does not spawn it.
    pub fn new(
        listener: TcpListener,
        state: ServerState,
        http_timeout: Duration,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            listener,
            state,
            http_timeout,
            shutdown_rx,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Returns a future that serves requests until the shutdown signal.
    pub fn run(self) -> impl Future<Output = ()> {
        let app = router(self.state, self.http_timeout);
        let mut shutdown_rx = self.shutdown_rx;
        let listener = self.listener;

        async move {
            let shutdown = async move {
                while !*shutdown_rx.borrow_and_update() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                trace!("HTTP server received shutdown signal.");
            };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                error!("HTTP server error: {}", e);
            }
            trace!("HTTP server task finished.");
        }
    }
}

pub fn router(state: ServerState, http_timeout: Duration) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/", get(index_handler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(http_timeout))
        .with_state(state)
}

async fn metrics_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let body = render_metrics(&state.manager, state.prom_handle.as_ref());
    ([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], body)
}

async fn health_handler(State(state): State<ServerState>) -> Json<HealthResponse> {
    let collectors: BTreeMap<String, &'static str> = state
        .manager
        .snapshot()
        .into_iter()
        .map(|(key, snapshot)| (key.to_string(), if snapshot.healthy { "ok" } else { "failed" }))
        .collect();
    let status = if collectors.values().all(|s| *s == "ok") {
        "ok"
    } else {
        "failed"
    };
    Json(HealthResponse { status, collectors })
}

async fn index_handler() -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Public Exporter</title>
    <meta charset="utf-8">
</head>
<body>
    <h1>Public Exporter</h1>
    <p>Version: {}</p>
    <ul>
        <li><a href="/metrics">Metrics</a> - Prometheus metrics endpoint</li>
        <li><a href="/health">Health</a> - Health check endpoint</li>
    </ul>
</body>
</html>"#,
        env!("CARGO_PKG_VERSION")
    ))
}

/// Renders the `/metrics` document from the manager's current snapshot.
pub fn render_metrics(manager: &CollectorManager, prom_handle: Option<&PrometheusHandle>) -> String {
    let snapshot = manager.snapshot();
    let mut lines: Vec<String> = Vec::with_capacity(snapshot.len() * 2 + 8);

    for (_, collector) in &snapshot {
        lines.push(collector.formatted_output.trim_end().to_string());
    }

    lines.push("# HELP collector_health_status Health of each collector (1 healthy, 0 failed)".to_string());
    lines.push("# TYPE collector_health_status gauge".to_string());
    let mut global_healthy = 1;
    for (key, collector) in &snapshot {
        let health = u8::from(collector.healthy);
        if health == 0 {
            global_healthy = 0;
        }
        lines.push(format!(
            r#"collector_health_status{{cluster="{}", collector="{}"}} {}"#,
            escape_label_value(&key.cluster),
            escape_label_value(&key.collector),
            health
        ));
    }

    lines.push("# HELP exporter_health_status Global health status of the exporter".to_string());
    lines.push("# TYPE exporter_health_status gauge".to_string());
    lines.push(format!("exporter_health_status {}", global_healthy));

    lines.push("# HELP collector_count Total number of active collectors".to_string());
    lines.push("# TYPE collector_count gauge".to_string());
    lines.push(format!("collector_count {}", manager.active_count()));

    let mut body = lines.join("\n");
    body.push('\n');
    if let Some(handle) = prom_handle {
        body.push_str(&handle.render());
    }
    body
}

/// Escapes backslashes, double quotes and newlines in a label value.
fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}
