//! Observability hooks for ingest and replay.
//!
//! Hooks are fire-and-forget: they return nothing and cannot fail the
//! operation they observe. Every method has a no-op default.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outcome of one ingest call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    /// Freshly committed
    Created,
    /// Resolved to an existing event by idempotency key
    Duplicate,
    /// Rejected by validation
    Invalid,
    /// Failed for any other reason
    Error,
}

impl IngestStatus {
    /// Label value used in metrics and API bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStatus::Created => "created",
            IngestStatus::Duplicate => "duplicate",
            IngestStatus::Invalid => "invalid",
            IngestStatus::Error => "error",
        }
    }
}

impl fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics sink for the event log
pub trait EventLogMetrics: Send + Sync {
    /// One ingest call finished with `status`
    fn record_ingest(&self, _stream_id: &str, _event_type: &str, _status: IngestStatus) {}

    /// Wall time of a successful ingest call
    fn observe_ingest_duration(&self, _duration: Duration) {}

    /// A replay task was started
    fn replay_started(&self) {}

    /// A replay delivered one event to its consumer
    fn replay_event_emitted(&self) {}

    /// A replay task exited, for any reason
    fn replay_finished(&self, _duration: Duration) {}
}

/// Metrics sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl EventLogMetrics for NoopMetrics {}
