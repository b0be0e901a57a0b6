//! Event ingestion with store-resolved sequence claims
//!
//! Sequence numbers are never handed out by a counter. Ingest reads the
//! stream's watermark once, proposes `watermark + 1`, and lets the store's
//! conditional write decide. A lost race bumps the proposal and tries again,
//! up to [`MAX_CLAIM_ATTEMPTS`] times.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use strata_domain::{Event, NewEventInput};
use strata_store::{EventStore, StoreError};
use tracing::{debug, error, warn};

use crate::error::IngestError;
use crate::idempotency::IdempotencyChecker;
use crate::ids::{Clock, IdGenerator, SystemClock, UlidGenerator};
use crate::metrics::{EventLogMetrics, IngestStatus, NoopMetrics};
use crate::validate::{validate_event_input, EventInput};

/// Conditional writes attempted per ingest before giving up
pub const MAX_CLAIM_ATTEMPTS: u32 = 3;

/// Per-item status of a batch ingest
pub type BatchStatus = IngestStatus;

// =============================================================================
// Batch result
// =============================================================================

/// Outcome of one item of a batch ingest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Stored (or pre-existing) event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Event>,
    /// Item status
    pub status: BatchStatus,
    /// Error message for `invalid` and `error` items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether this call committed the event
    pub created: bool,
}

impl BatchResult {
    fn stored(event: Event, created: bool) -> Self {
        Self {
            event: Some(event),
            status: if created { IngestStatus::Created } else { IngestStatus::Duplicate },
            error: None,
            created,
        }
    }

    fn failed(status: BatchStatus, err: &IngestError) -> Self {
        Self {
            event: None,
            status,
            error: Some(err.to_string()),
            created: false,
        }
    }
}

// =============================================================================
// Ingest service
// =============================================================================

/// Appends events to streams.
///
/// Holds only shared handles; clones are cheap and every call is independent.
pub struct IngestService<S: ?Sized> {
    store: Arc<S>,
    idempotency: IdempotencyChecker<S>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn EventLogMetrics>,
}

impl<S: ?Sized> Clone for IngestService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            idempotency: self.idempotency.clone(),
            ids: Arc::clone(&self.ids),
            clock: Arc::clone(&self.clock),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<S: EventStore + ?Sized> IngestService<S> {
    /// Service over `store` with the wall clock, ULIDs and no metrics
    pub fn new(store: Arc<S>) -> Self {
        Self {
            idempotency: IdempotencyChecker::new(Arc::clone(&store)),
            store,
            ids: Arc::new(UlidGenerator::new()),
            clock: Arc::new(SystemClock),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Replace the clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the id generator
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Replace the metrics sink
    pub fn with_metrics(mut self, metrics: Arc<dyn EventLogMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Append one event.
    ///
    /// Returns the stored event and whether this call created it. A request
    /// carrying an idempotency key that is already recorded in the stream
    /// returns the recorded event with `created = false`.
    ///
    /// # Errors
    /// - `Validation` for missing fields (nothing written)
    /// - `IdempotencyUnresolved` when a key race cannot be read back
    /// - `MaxRetries` when every claim attempt lost a sequence race
    /// - `Store` / `IdentifierGeneration` for collaborator failures
    pub async fn ingest(&self, input: EventInput) -> Result<(Event, bool), IngestError> {
        let started = Instant::now();
        let stream_id = input.stream_id.clone();
        let event_type = input.event_type.clone();

        let result = self.try_ingest(input).await;

        let status = match &result {
            Ok((_, true)) => IngestStatus::Created,
            Ok((_, false)) => IngestStatus::Duplicate,
            Err(IngestError::Validation(_)) => IngestStatus::Invalid,
            Err(_) => IngestStatus::Error,
        };
        self.metrics.record_ingest(&stream_id, &event_type, status);
        if result.is_ok() {
            self.metrics.observe_ingest_duration(started.elapsed());
        }

        result
    }

    async fn try_ingest(&self, input: EventInput) -> Result<(Event, bool), IngestError> {
        validate_event_input(&input)?;

        let key = input.idempotency_key().unwrap_or_default().to_string();
        if let Some(existing) = self.idempotency.find_existing(&input.stream_id, &key).await? {
            debug!(
                stream_id = %input.stream_id,
                event_id = %existing.event_id,
                "Idempotent duplicate, returning recorded event"
            );
            return Ok((existing, false));
        }

        let mut watermark = self.store.get_latest_sequence(&input.stream_id).await?;

        for attempt in 1..=MAX_CLAIM_ATTEMPTS {
            let now = self.clock.now();
            let candidate = Event::new(NewEventInput {
                event_id: self.ids.next_id(now)?,
                stream_id: input.stream_id.clone(),
                sequence_number: watermark + 1,
                event_type: input.event_type.clone(),
                payload: input.payload.clone(),
                metadata: input.metadata.clone(),
                idempotency_key: input.idempotency_key.clone(),
                occurred_at: input.occurred_at,
                ingested_at: now,
                schema_version: input.schema_version,
            })?;

            match self.store.put_event(&candidate).await {
                Ok(()) => {
                    debug!(
                        event_id = %candidate.event_id,
                        stream_id = %candidate.stream_id,
                        sequence = candidate.sequence_number,
                        attempt,
                        "Event ingested"
                    );
                    return Ok((candidate, true));
                }
                Err(StoreError::SequenceConflict { sequence, .. }) => {
                    warn!(
                        stream_id = %input.stream_id,
                        sequence,
                        attempt,
                        "Sequence claimed by another writer, retrying"
                    );
                    watermark += 1;
                }
                Err(StoreError::IdempotencyConflict { .. }) => {
                    return match self.idempotency.find_existing(&input.stream_id, &key).await? {
                        Some(winner) => {
                            debug!(
                                stream_id = %input.stream_id,
                                event_id = %winner.event_id,
                                "Lost idempotency race, returning winner"
                            );
                            Ok((winner, false))
                        }
                        None => {
                            error!(
                                stream_id = %input.stream_id,
                                key = %key,
                                "Idempotency conflict but no recorded event"
                            );
                            Err(IngestError::IdempotencyUnresolved {
                                stream_id: input.stream_id,
                                key,
                            })
                        }
                    };
                }
                Err(err) => return Err(err.into()),
            }
        }

        error!(
            stream_id = %input.stream_id,
            attempts = MAX_CLAIM_ATTEMPTS,
            "Gave up claiming a sequence number"
        );
        Err(IngestError::MaxRetries {
            stream_id: input.stream_id,
            attempts: MAX_CLAIM_ATTEMPTS,
        })
    }

    /// Append several events, one result per input.
    ///
    /// Every input is validated before anything is written. If any input is
    /// invalid the whole batch is rejected with a single `invalid` result.
    /// Otherwise items are ingested in order and a failing item does not stop
    /// the ones after it.
    pub async fn batch_ingest(&self, inputs: Vec<EventInput>) -> Vec<BatchResult> {
        if let Some(err) = inputs.iter().find_map(|input| validate_event_input(input).err()) {
            warn!(items = inputs.len(), error = %err, "Rejecting batch with invalid input");
            return vec![BatchResult::failed(IngestStatus::Invalid, &err)];
        }

        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            let result = match self.ingest(input).await {
                Ok((event, created)) => BatchResult::stored(event, created),
                Err(err) => BatchResult::failed(IngestStatus::Error, &err),
            };
            results.push(result);
        }
        results
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{FixedClock, IdError};
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use strata_store::MemoryStore;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    fn input(stream_id: &str) -> EventInput {
        EventInput {
            stream_id: stream_id.to_string(),
            event_type: "order_created".to_string(),
            payload: json!({"order_id": "o-1"}),
            occurred_at: Some(t0()),
            ..EventInput::default()
        }
    }

    fn keyed(stream_id: &str, key: &str) -> EventInput {
        EventInput {
            idempotency_key: Some(key.to_string()),
            ..input(stream_id)
        }
    }

    fn service(store: &Arc<MemoryStore>) -> IngestService<MemoryStore> {
        IngestService::new(Arc::clone(store)).with_clock(Arc::new(FixedClock::new(t0())))
    }

    #[derive(Default)]
    struct RecordingMetrics {
        statuses: Mutex<Vec<IngestStatus>>,
        durations: Mutex<Vec<Duration>>,
    }

    impl EventLogMetrics for RecordingMetrics {
        fn record_ingest(&self, _stream_id: &str, _event_type: &str, status: IngestStatus) {
            self.statuses.lock().unwrap().push(status);
        }

        fn observe_ingest_duration(&self, duration: Duration) {
            self.durations.lock().unwrap().push(duration);
        }
    }

    struct FailingIds;

    impl IdGenerator for FailingIds {
        fn next_id(&self, _at: DateTime<Utc>) -> Result<String, IdError> {
            Err(IdError("entropy read failed".to_string()))
        }
    }

    #[tokio::test]
    async fn test_first_event_gets_sequence_one() {
        let store = Arc::new(MemoryStore::new());
        let (event, created) = service(&store).ingest(input("s-1")).await.unwrap();

        assert!(created);
        assert_eq!(event.sequence_number, 1);
        assert_eq!(event.sort_key, "EVENT#s-1#00000000000000000001");
        assert_eq!(event.ingested_at, t0());
        assert_eq!(event.schema_version, 1);
        assert_eq!(store.get_by_event_id(&event.event_id).await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_sequences_are_dense_per_stream() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store);

        for _ in 0..3 {
            service.ingest(input("a")).await.unwrap();
        }
        service.ingest(input("b")).await.unwrap();

        assert_eq!(store.sequences("a"), vec![1, 2, 3]);
        assert_eq!(store.sequences("b"), vec![1]);
    }

    #[tokio::test]
    async fn test_validation_failure_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let bad = EventInput {
            payload: serde_json::Value::Null,
            ..input("s-1")
        };

        let err = service(&store).ingest(bad).await.unwrap_err();

        assert!(err.is_validation());
        assert_eq!(store.event_count(), 0);
    }

    #[tokio::test]
    async fn test_idempotent_retry_returns_recorded_event() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store);

        let (first, created_first) = service.ingest(keyed("s-1", "k-1")).await.unwrap();
        let (second, created_second) = service.ingest(keyed("s-1", "k-1")).await.unwrap();

        assert!(created_first);
        assert!(!created_second);
        assert_eq!(first, second);
        assert_eq!(store.event_count(), 1);
    }

    #[tokio::test]
    async fn test_same_key_in_other_stream_is_independent() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store);

        service.ingest(keyed("s-1", "k-1")).await.unwrap();
        let (_, created) = service.ingest(keyed("s-2", "k-1")).await.unwrap();

        assert!(created);
        assert_eq!(store.event_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_key_never_deduplicates() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store);

        service.ingest(keyed("s-1", "")).await.unwrap();
        let (event, created) = service.ingest(keyed("s-1", "")).await.unwrap();

        assert!(created);
        assert_eq!(event.sequence_number, 2);
        assert!(event.idempotency_key.is_none());
    }

    #[tokio::test]
    async fn test_sequence_conflict_retries_at_next_sequence() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_put(StoreError::sequence_conflict("s-1", 1));

        let (event, created) = service(&store).ingest(input("s-1")).await.unwrap();

        assert!(created);
        assert_eq!(event.sequence_number, 2);
    }

    #[tokio::test]
    async fn test_persistent_sequence_conflicts_exhaust_retries() {
        let store = Arc::new(MemoryStore::new());
        for seq in 1..=3 {
            store.fail_next_put(StoreError::sequence_conflict("s-1", seq));
        }

        let err = service(&store).ingest(input("s-1")).await.unwrap_err();

        assert!(matches!(err, IngestError::MaxRetries { attempts: 3, .. }));
        assert_eq!(store.event_count(), 0);
    }

    #[tokio::test]
    async fn test_unresolvable_idempotency_conflict_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_put(StoreError::idempotency_conflict("s-1", "k-1"));

        let err = service(&store).ingest(keyed("s-1", "k-1")).await.unwrap_err();

        assert!(matches!(err, IngestError::IdempotencyUnresolved { .. }));
        assert_eq!(store.event_count(), 0);
    }

    #[tokio::test]
    async fn test_other_store_errors_propagate_without_retry() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_put(StoreError::Database("connection reset".to_string()));

        let err = service(&store).ingest(input("s-1")).await.unwrap_err();

        assert!(matches!(err, IngestError::Store(StoreError::Database(_))));
        // The queued fault was consumed by the single attempt
        let (event, _) = service(&store).ingest(input("s-1")).await.unwrap();
        assert_eq!(event.sequence_number, 1);
    }

    #[tokio::test]
    async fn test_watermark_read_failure_propagates() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_query(StoreError::Database("timeout".to_string()));

        let err = service(&store).ingest(input("s-1")).await.unwrap_err();

        assert!(matches!(err, IngestError::Store(StoreError::Database(_))));
    }

    #[tokio::test]
    async fn test_id_generator_failure_propagates() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store).with_id_generator(Arc::new(FailingIds));

        let err = service.ingest(input("s-1")).await.unwrap_err();

        assert!(matches!(err, IngestError::IdentifierGeneration(_)));
        assert_eq!(store.event_count(), 0);
    }

    #[tokio::test]
    async fn test_metrics_record_every_outcome() {
        let store = Arc::new(MemoryStore::new());
        let metrics = Arc::new(RecordingMetrics::default());
        let service = service(&store).with_metrics(metrics.clone());

        service.ingest(keyed("s-1", "k-1")).await.unwrap();
        service.ingest(keyed("s-1", "k-1")).await.unwrap();
        service.ingest(EventInput::default()).await.unwrap_err();
        store.fail_next_put(StoreError::Database("down".to_string()));
        service.ingest(input("s-1")).await.unwrap_err();

        assert_eq!(
            *metrics.statuses.lock().unwrap(),
            vec![
                IngestStatus::Created,
                IngestStatus::Duplicate,
                IngestStatus::Invalid,
                IngestStatus::Error
            ]
        );
        assert_eq!(metrics.durations.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_batch_rejects_everything_on_one_invalid_input() {
        let store = Arc::new(MemoryStore::new());
        let inputs = vec![
            input("s-1"),
            EventInput {
                event_type: String::new(),
                ..input("s-1")
            },
            input("s-1"),
        ];

        let results = service(&store).batch_ingest(inputs).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, BatchStatus::Invalid);
        assert!(results[0].event.is_none());
        assert!(results[0].error.as_deref().unwrap().contains("event_type"));
        assert_eq!(store.event_count(), 0);
    }

    #[tokio::test]
    async fn test_batch_reports_each_item() {
        let store = Arc::new(MemoryStore::new());
        let service = service(&store);
        service.ingest(keyed("s-1", "dup")).await.unwrap();

        let results = service
            .batch_ingest(vec![input("s-1"), keyed("s-1", "dup"), input("s-2")])
            .await;

        let statuses: Vec<_> = results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![BatchStatus::Created, BatchStatus::Duplicate, BatchStatus::Created]
        );
        assert!(results[0].created);
        assert!(!results[1].created);
        assert_eq!(results[0].event.as_ref().unwrap().sequence_number, 2);
    }

    #[tokio::test]
    async fn test_batch_item_error_does_not_stop_later_items() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_put(StoreError::Database("blip".to_string()));

        let results = service(&store)
            .batch_ingest(vec![input("s-1"), input("s-1")])
            .await;

        assert_eq!(results[0].status, BatchStatus::Error);
        assert!(results[0].error.is_some());
        assert_eq!(results[1].status, BatchStatus::Created);
        assert_eq!(store.sequences("s-1"), vec![1]);
    }

    #[test]
    fn test_batch_result_json_shape() {
        let result = BatchResult::failed(
            IngestStatus::Invalid,
            &IngestError::Validation("missing required fields: payload".to_string()),
        );
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["status"], "invalid");
        assert_eq!(value["created"], false);
        assert!(value.get("event").is_none());
    }
}
