//! Configuration management for the NetApp exporter.
//!
//! Supports loading configuration from:
//! - TOML configuration files
//! - Environment variables (with `NETAPP_EXPORTER_` prefix)
//! - Command-line arguments

use crate::error::{ExporterError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Connection settings for one filer.
#[derive(Clone, Serialize, Deserialize)]
pub struct FilerConfig {
    /// Display name, used in logs and as the `filer` label
    pub name: String,

    /// ONTAP API base URL (e.g., "https://filer-a.example.com")
    pub host: String,

    /// API user
    #[serde(default)]
    pub username: String,

    /// API password
    #[serde(default)]
    pub password: String,

    /// Verify TLS certificates (set to false for self-signed certs)
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Page size for volume listings
    #[serde(default = "default_max_records")]
    pub max_records: u32,

    /// Per-filer cache retention; falls back to the exporter default
    #[serde(default)]
    pub retention_seconds: Option<u64>,
}

impl std::fmt::Debug for FilerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilerConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"***REDACTED***")
            .field("verify_tls", &self.verify_tls)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_records", &self.max_records)
            .field("retention_seconds", &self.retention_seconds)
            .finish()
    }
}

/// Exporter specific settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExporterConfig {
    /// Address to listen on for metrics endpoint
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// How long a fetched volume inventory is served before it is dropped
    #[serde(default = "default_retention_seconds")]
    pub retention_seconds: u64,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            log_level: default_log_level(),
            retention_seconds: default_retention_seconds(),
        }
    }
}

/// Main configuration structure for the NetApp exporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Exporter server configuration
    #[serde(default)]
    pub exporter: ExporterConfig,

    /// Filers to monitor, one collector each
    #[serde(default)]
    pub filers: Vec<FilerConfig>,
}

fn default_verify_tls() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_max_records() -> u32 {
    500
}

fn default_listen_address() -> String {
    "0.0.0.0:9108".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_retention_seconds() -> u64 {
    300
}

impl Settings {
    /// Load configuration from a file and environment variables.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use netapp_exporter::config::Settings;
    ///
    /// let settings = Settings::load(Some("config/default.toml")).unwrap();
    /// ```
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(config::File::with_name(path));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("NETAPP_EXPORTER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let settings: Settings = config.try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Cache retention for a filer.
    pub fn retention_for(&self, filer: &FilerConfig) -> Duration {
        Duration::from_secs(
            filer
                .retention_seconds
                .unwrap_or(self.exporter.retention_seconds),
        )
    }

    fn validate(&self) -> Result<()> {
        if self.filers.is_empty() {
            return Err(invalid("at least one filer must be configured"));
        }
        if self.exporter.retention_seconds == 0 {
            return Err(invalid("retention_seconds must be greater than zero"));
        }

        let mut seen = HashSet::new();
        for filer in &self.filers {
            if filer.name.is_empty() {
                return Err(invalid("filer name cannot be empty"));
            }
            if !seen.insert(filer.name.as_str()) {
                return Err(invalid(&format!("duplicate filer name '{}'", filer.name)));
            }
            if filer.host.is_empty() {
                return Err(invalid(&format!("filer '{}' has no host", filer.name)));
            }
            if filer.username.is_empty() || filer.password.is_empty() {
                return Err(invalid(&format!(
                    "filer '{}' requires username and password",
                    filer.name
                )));
            }
            if filer.retention_seconds == Some(0) {
                return Err(invalid(&format!(
                    "filer '{}' retention_seconds must be greater than zero",
                    filer.name
                )));
            }
        }

        Ok(())
    }
}

fn invalid(message: &str) -> ExporterError {
    ExporterError::Config(config::ConfigError::Message(message.to_string()))
}
