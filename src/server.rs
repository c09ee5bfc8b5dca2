//! HTTP server for exposing Prometheus metrics.
//!
//! This module provides an Axum-based HTTP server that serves the `/metrics`
//! endpoint for Prometheus scraping and a `/health` endpoint for health checks.

use crate::error::{ExporterError, Result};
use crate::health::HealthMonitor;
use crate::metrics;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::Registry;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application state.
#[derive(Clone)]
struct AppState {
    registry: Registry,
    health: HealthMonitor,
}

/// Build the exporter's router.
pub fn router(registry: Registry, health: HealthMonitor) -> Router {
    let state = AppState { registry, health };

    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/", get(root_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
///
/// # Arguments
///
/// * `listen_address` - Address to bind to (e.g., "0.0.0.0:9108")
/// * `registry` - Registry holding one volume collector per filer
/// * `health` - Monitor fed by the collectors' failure channel
pub async fn start_server(
    listen_address: &str,
    registry: Registry,
    health: HealthMonitor,
) -> Result<()> {
    let app = router(registry, health);

    info!("Starting HTTP server on {}", listen_address);

    let listener = TcpListener::bind(listen_address).await?;

    axum::serve(listener, app)
        .await
        .map_err(|e| ExporterError::Server(e.to_string()))?;

    Ok(())
}

/// Handler for /metrics endpoint.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    info!("Received metrics scrape request");

    // Collectors block on filer fetches.
    let registry = state.registry.clone();
    let encoded = tokio::task::spawn_blocking(move || metrics::encode(&registry))
        .await
        .map_err(|e| ExporterError::Metrics(e.to_string()))
        .and_then(|r| r);

    match encoded {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => {
            warn!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Handler for /health endpoint.
async fn health_handler(State(state): State<AppState>) -> Response {
    let failing = state.health.failing_filers();
    if failing.is_empty() {
        return (StatusCode::OK, "OK").into_response();
    }

    let body = failing
        .iter()
        .map(|(filer, message)| format!("{}: {}", filer, message))
        .collect::<Vec<_>>()
        .join("\n");
    (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
}

/// Handler for root endpoint.
async fn root_handler() -> Response {
    let html = r#"
<!DOCTYPE html>
<html>
<head>
    <title>NetApp Exporter</title>
    <style>
        body { font-family: Arial, sans-serif; margin: 40px; }
        h1 { color: #333; }
        a { color: #0066cc; text-decoration: none; }
        a:hover { text-decoration: underline; }
        .info { background: #f0f0f0; padding: 15px; border-radius: 5px; margin: 20px 0; }
    </style>
</head>
<body>
    <h1>NetApp Exporter</h1>
    <div class="info">
        <p>Prometheus metrics exporter for NetApp volume capacity</p>
        <p><strong>Endpoints:</strong></p>
        <ul>
            <li><a href="/metrics">/metrics</a> - Prometheus metrics</li>
            <li><a href="/health">/health</a> - Health check</li>
        </ul>
    </div>
</body>
</html>
"#;

    (StatusCode::OK, html).into_response()
}
