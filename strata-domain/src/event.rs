//! Event record
//!
//! An `Event` is built exactly once, at write time, by [`Event::new`] and is
//! read-only afterwards. Construction validates required fields and derives
//! the storage sort key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::value_objects::DomainError;

/// Width of the zero-padded sequence inside a sort key (fits any positive i64)
const SORT_KEY_SEQ_WIDTH: usize = 20;

/// Storage sort key for an event at `sequence` within `stream_id`.
///
/// Lexicographic order of the keys equals numeric order of the sequences
/// for a fixed stream.
pub fn sort_key(stream_id: &str, sequence: i64) -> String {
    format!("EVENT#{stream_id}#{sequence:0width$}", width = SORT_KEY_SEQ_WIDTH)
}

/// Immutable, committed domain event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    // Identity
    /// Globally unique, time-sortable identifier
    pub event_id: String,

    /// Derived storage key, never exposed over the wire
    #[serde(skip)]
    pub sort_key: String,

    // Stream partitioning
    /// Stream this event belongs to
    pub stream_id: String,
    /// Per-stream position, starting at 1
    pub sequence_number: i64,

    // Type & data
    /// Free-form classification
    pub event_type: String,
    /// Caller-defined payload
    pub payload: serde_json::Value,
    /// Optional string metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,

    // Idempotency
    /// Caller-supplied deduplication key, unique per stream when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,

    // Temporal
    /// Business time supplied by the producer
    pub occurred_at: DateTime<Utc>,
    /// System time assigned at ingest
    pub ingested_at: DateTime<Utc>,

    /// Payload schema version, at least 1
    pub schema_version: i32,
}

/// Raw fields used to construct an [`Event`]
#[derive(Debug, Clone, Default)]
pub struct NewEventInput {
    /// Event identifier
    pub event_id: String,
    /// Stream identifier
    pub stream_id: String,
    /// Assigned sequence number
    pub sequence_number: i64,
    /// Event type
    pub event_type: String,
    /// Payload (`Null` counts as missing)
    pub payload: serde_json::Value,
    /// Metadata
    pub metadata: BTreeMap<String, String>,
    /// Idempotency key (empty counts as absent)
    pub idempotency_key: Option<String>,
    /// Business time
    pub occurred_at: Option<DateTime<Utc>>,
    /// Ingest time
    pub ingested_at: DateTime<Utc>,
    /// Schema version; non-positive values become 1
    pub schema_version: i32,
}

impl Event {
    /// Validate `input` and build the event.
    ///
    /// # Errors
    /// Returns `DomainError::Validation` if the event id, stream id or event
    /// type is empty, the payload is missing, or `occurred_at` is unset.
    pub fn new(input: NewEventInput) -> Result<Self, DomainError> {
        let occurred_at = match input.occurred_at {
            Some(at) => at,
            None => return Err(DomainError::validation("occurred_at is required")),
        };
        if input.event_id.is_empty()
            || input.stream_id.is_empty()
            || input.event_type.is_empty()
            || input.payload.is_null()
        {
            return Err(DomainError::validation(
                "event_id, stream_id, event_type and payload are required",
            ));
        }

        let schema_version = if input.schema_version <= 0 { 1 } else { input.schema_version };
        let idempotency_key = input.idempotency_key.filter(|key| !key.is_empty());

        Ok(Self {
            sort_key: sort_key(&input.stream_id, input.sequence_number),
            event_id: input.event_id,
            stream_id: input.stream_id,
            sequence_number: input.sequence_number,
            event_type: input.event_type,
            payload: input.payload,
            metadata: input.metadata,
            idempotency_key,
            occurred_at,
            ingested_at: input.ingested_at,
            schema_version,
        })
    }

    /// Idempotency key, if one was supplied
    pub fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key.as_deref()
    }
}

// =============================================================================
// Tests
// =============================================================================
