//! Error types for the NetApp exporter.
//!
//! This module defines custom error types using `thiserror` for structured
//! error handling throughout the application.

use thiserror::Error;

/// Main error type for NetApp exporter operations.
#[derive(Debug, Error)]
pub enum ExporterError {
    /// Transport-level failure talking to a filer
    #[error("NetApp API request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Filer answered with a non-success status
    #[error("NetApp API returned {status} for {url}")]
    Api { status: u16, url: String },

    /// Error parsing a filer API response
    #[error("Failed to parse NetApp API response: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Metrics error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// HTTP server error
    #[error("HTTP server error: {0}")]
    Server(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for exporter operations.
pub type Result<T> = std::result::Result<T, ExporterError>;
