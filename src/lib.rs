//! # NetApp Exporter
//!
//! A Prometheus metrics exporter for NetApp filer volumes.
//!
//! ## Overview
//!
//! For every configured filer the exporter registers one
//! [`metrics::VolumeCollector`]. On scrape, a collector serves its cached
//! volume inventory, or fetches a new one from the filer's ONTAP API when the
//! cache is empty, and exports eleven gauges per volume:
//!
//! - Volume state (1: online, 2: restricted, 3: offline, 4: quiesced)
//! - Total, used and available bytes
//! - Snapshot used, available and reserved bytes
//! - Used percentage and space savings (total, compression, deduplication)
//!
//! Fetched inventories are kept for a retention period so that frequent
//! scrapes do not turn into frequent API calls.
//!
//! ## Quick Start
//!
//! ```no_run
//! use netapp_exporter::{
//!     client::NetAppClient, config::Settings, health::HealthMonitor,
//!     metrics::VolumeCollector, server::start_server,
//! };
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load(Some("config/default.toml"))?;
//!     let registry = prometheus::Registry::new();
//!
//!     for filer in &settings.filers {
//!         let client = NetAppClient::new(filer.clone())?;
//!         let collector = VolumeCollector::new(
//!             filer.name.clone(),
//!             Arc::new(client),
//!             settings.retention_for(filer),
//!             None,
//!         )?;
//!         registry.register(Box::new(collector))?;
//!     }
//!
//!     let health = HealthMonitor::new(std::time::Duration::from_secs(300));
//!     tokio::runtime::Runtime::new()?
//!         .block_on(start_server(&settings.exporter.listen_address, registry.clone(), health))?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`client`] - Volume types and the ONTAP API client
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling
//! - [`health`] - Fetch failure reporting
//! - [`metrics`] - Volume metric table and the caching collector
//! - [`server`] - HTTP server for exposing metrics

pub mod client;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod server;

pub use error::{ExporterError, Result};
