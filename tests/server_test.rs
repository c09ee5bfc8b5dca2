//! HTTP server endpoint tests

use netapp_exporter::{
    client::{StorageClient, Volume, VolumeState},
    error::{ExporterError, Result},
    health::{self, FetchFailure, HealthMonitor},
    metrics::VolumeCollector,
    server::router,
};
use prometheus::Registry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

struct StaticClient {
    fail: bool,
}

impl StorageClient for StaticClient {
    fn list_volumes(&self) -> Result<Vec<Volume>> {
        if self.fail {
            return Err(ExporterError::Parse("unexpected end of input".to_string()));
        }
        Ok(vec![Volume {
            vserver: "vs1".to_string(),
            volume: "vol1".to_string(),
            state: VolumeState::Online,
            size_total: 2048,
            size_used: 512,
            size_available: 1536,
            percentage_size_used: 25.0,
            ..Default::default()
        }])
    }
}

/// Serve the exporter on an ephemeral port and return its base URL.
async fn spawn_exporter(registry: Registry, health: HealthMonitor) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(registry, health);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

fn registry_with(fail: bool, error_tx: Option<tokio::sync::mpsc::Sender<FetchFailure>>) -> Registry {
    let collector = VolumeCollector::new(
        "filer-a",
        Arc::new(StaticClient { fail }),
        Duration::from_secs(60),
        error_tx,
    )
    .unwrap();
    let registry = Registry::new();
    registry.register(Box::new(collector)).unwrap();
    registry
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let base = spawn_exporter(
        registry_with(false, None),
        HealthMonitor::new(Duration::from_secs(60)),
    )
    .await;

    let response = reqwest::get(format!("{}/metrics", base)).await.unwrap();
    assert_eq!(response.status(), 200);

    let body = response.text().await.unwrap();
    assert!(body.contains("# HELP"));
    assert!(body.contains("# TYPE"));
    assert!(body.contains("netapp_volume_state{"));
    assert!(body.contains(r#"vserver="vs1""#));
    assert!(body.contains(r#"volume="vol1""#));
    assert_eq!(
        body.lines()
            .filter(|l| l.starts_with("netapp_volume_"))
            .count(),
        11
    );
}

#[tokio::test]
async fn test_metrics_endpoint_with_failing_filer() {
    let base = spawn_exporter(
        registry_with(true, None),
        HealthMonitor::new(Duration::from_secs(60)),
    )
    .await;

    let response = reqwest::get(format!("{}/metrics", base)).await.unwrap();
    assert_eq!(response.status(), 200);

    let body = response.text().await.unwrap();
    assert!(!body.contains("netapp_volume_state{"));
}

#[tokio::test]
async fn test_health_endpoint() {
    let health = HealthMonitor::new(Duration::from_secs(60));
    let base = spawn_exporter(registry_with(false, None), health.clone()).await;

    let response = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");

    health.record(FetchFailure {
        filer: "filer-a".to_string(),
        message: "connection refused".to_string(),
        at: Instant::now(),
    });

    let response = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(response.status(), 503);
    assert!(response
        .text()
        .await
        .unwrap()
        .contains("filer-a: connection refused"));
}

#[tokio::test]
async fn test_fetch_failure_reaches_health_endpoint() {
    let health = HealthMonitor::new(Duration::from_secs(60));
    let (tx, rx) = health::channel(8);
    tokio::spawn(health.clone().run(rx));

    let base = spawn_exporter(registry_with(true, Some(tx)), health.clone()).await;
    reqwest::get(format!("{}/metrics", base)).await.unwrap();

    let mut status = 0;
    for _ in 0..50 {
        status = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .status()
            .as_u16();
        if status == 503 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, 503);
}

#[tokio::test]
async fn test_root_endpoint() {
    let base = spawn_exporter(
        registry_with(false, None),
        HealthMonitor::new(Duration::from_secs(60)),
    )
    .await;

    let body = reqwest::get(format!("{}/", base))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("NetApp Exporter"));
    assert!(body.contains("/metrics"));
}
