//! Daemon error types.

use strata_eventlog::IngestError;
use strata_store::StoreError;
use thiserror::Error;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Ingest error
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Socket or listener error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
