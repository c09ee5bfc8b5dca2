use anyhow::{Context, Result};
use clap::Parser;
use netapp_exporter::{
    client::NetAppClient,
    config::Settings,
    health::{self, HealthMonitor},
    metrics::VolumeCollector,
    server::start_server,
};
use prometheus::Registry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const FAILURE_CHANNEL_CAPACITY: usize = 64;

/// NetApp Exporter - Prometheus metrics exporter for NetApp filer volumes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Address to listen on (overrides config)
    #[arg(short, long, env = "NETAPP_EXPORTER_LISTEN_ADDRESS")]
    listen_address: Option<String>,
}

// Filer clients block on I/O, so they are built and dropped outside the runtime.
fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Load configuration
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(addr) = args.listen_address {
        settings.exporter.listen_address = addr;
    }

    // Initialize logging
    init_logging(&settings.exporter.log_level)?;

    info!("Starting NetApp Exporter");
    info!("Listen address: {}", settings.exporter.listen_address);

    let registry = Registry::new();
    let (failure_tx, failure_rx) = health::channel(FAILURE_CHANNEL_CAPACITY);
    let mut longest_retention = Duration::ZERO;

    for filer in &settings.filers {
        let retention = settings.retention_for(filer);
        longest_retention = longest_retention.max(retention);

        let client = NetAppClient::new(filer.clone())
            .with_context(|| format!("Failed to create client for filer {}", filer.name))?;
        let collector = VolumeCollector::new(
            client.name().to_string(),
            Arc::new(client),
            retention,
            Some(failure_tx.clone()),
        )?;
        registry
            .register(Box::new(collector))
            .with_context(|| format!("Failed to register collector for filer {}", filer.name))?;

        info!(
            "Registered filer {} ({}), retention {}s",
            filer.name,
            filer.host,
            retention.as_secs()
        );
    }
    drop(failure_tx);

    #[cfg(target_os = "linux")]
    registry
        .register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))
        .context("Failed to register process collector")?;

    let health = HealthMonitor::new(longest_retention);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let served = runtime.block_on(async {
        tokio::spawn(health.clone().run(failure_rx));

        info!("Starting HTTP server...");
        start_server(&settings.exporter.listen_address, registry.clone(), health).await
    });

    // Drop remaining tasks before the registry, which owns the blocking clients.
    drop(runtime);
    drop(registry);

    if let Err(e) = served {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}

/// Initialize structured logging with tracing.
fn init_logging(log_level: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
