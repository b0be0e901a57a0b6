//! Event store trait definition (Port)
//!
//! This trait defines the storage contract the event log is written against.
//! Implementations can be PostgreSQL, in-memory, or wrappers for testing.

use crate::error::StoreError;
use async_trait::async_trait;
use strata_domain::{Direction, Event, StreamSummary};
use tokio_util::sync::CancellationToken;

/// Page size used when the caller passes a non-positive limit
pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// Largest page a single range query returns
pub const MAX_PAGE_LIMIT: usize = 200;

/// Default number of streams returned by [`EventStore::list_streams`]
pub(crate) const DEFAULT_STREAM_LIST_LIMIT: usize = 200;

/// Clamp a caller-supplied page limit into `1..=MAX_PAGE_LIMIT`
pub fn clamp_limit(limit: i32) -> usize {
    if limit <= 0 {
        DEFAULT_PAGE_LIMIT
    } else {
        (limit as usize).min(MAX_PAGE_LIMIT)
    }
}

/// One page of a stream range scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamPage {
    /// Events in scan order
    pub events: Vec<Event>,
    /// Sequence to resume from (last returned ± 1, or the start when empty)
    pub next_sequence: i64,
    /// Whether more events may exist beyond this page
    pub has_more: bool,
}

/// Storage contract for the append-only log (append-only, never updated)
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Commit the event, its sequence claim and (if keyed) its idempotency
    /// claim atomically.
    ///
    /// # Errors
    /// - `IdempotencyConflict` if the idempotency claim already exists
    /// - `SequenceConflict` if any other precondition failed
    async fn put_event(&self, event: &Event) -> Result<(), StoreError>;

    /// Bulk load without uniqueness enforcement.
    ///
    /// Writes in chunks, retrying unprocessed items with linear backoff.
    /// A repeated `(stream, sequence)` is stored rather than rejected; which
    /// copy a range scan returns is up to the backend.
    ///
    /// # Errors
    /// - `Unprocessed` if items remain after the bounded number of attempts
    /// - `Cancelled` if `cancel` fires while backing off
    async fn put_events_batch(
        &self,
        events: &[Event],
        cancel: &CancellationToken,
    ) -> Result<(), StoreError>;

    /// Load a single event by its identifier
    async fn get_by_event_id(&self, event_id: &str) -> Result<Event, StoreError>;

    /// Load the event that owns the `(stream_id, key)` idempotency claim
    async fn find_by_idempotency_key(&self, stream_id: &str, key: &str)
        -> Result<Event, StoreError>;

    /// Highest committed sequence of the stream, 0 when it has no events
    async fn get_latest_sequence(&self, stream_id: &str) -> Result<i64, StoreError>;

    /// Ordered range scan over the stream's sequence index.
    ///
    /// Forward scans return `seq >= from_sequence` ascending, backward scans
    /// return `seq <= from_sequence` descending. `limit` is clamped with
    /// [`clamp_limit`].
    async fn query_by_stream(
        &self,
        stream_id: &str,
        from_sequence: i64,
        direction: Direction,
        limit: i32,
    ) -> Result<StreamPage, StoreError>;

    /// Known streams with their latest sequence (administrative, full scan)
    async fn list_streams(&self, limit: i32) -> Result<Vec<StreamSummary>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(0), DEFAULT_PAGE_LIMIT);
        assert_eq!(clamp_limit(-5), DEFAULT_PAGE_LIMIT);
        assert_eq!(clamp_limit(10), 10);
        assert_eq!(clamp_limit(10_000), MAX_PAGE_LIMIT);
    }
}
