//! In-memory store implementation
//!
//! Used for testing and development without a database.
//! A single `RwLock` guards all indexes, so the event record, its sequence
//! claim and its idempotency claim always commit together.

use crate::batch::{write_in_chunks, ChunkWriter};
use crate::error::StoreError;
use crate::repository::{clamp_limit, EventStore, StreamPage, DEFAULT_STREAM_LIST_LIMIT};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use strata_domain::{Direction, Event, StreamSummary};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// In-memory store for testing
pub struct MemoryStore {
    state: RwLock<StoreState>,
    faults: Mutex<Faults>,
}

#[derive(Default)]
struct StoreState {
    /// Event records by event id
    events: HashMap<String, Event>,
    /// Sequence claims: stream id -> sequence -> owning event id
    sequences: HashMap<String, BTreeMap<i64, String>>,
    /// Idempotency claims: (stream id, key) -> owning event id
    idempotency: HashMap<(String, String), String>,
}

/// Scripted failures, consumed in order
#[derive(Default)]
struct Faults {
    put: VecDeque<StoreError>,
    query: VecDeque<StoreError>,
    throttled_batches: usize,
}

impl StoreState {
    /// Index entries already present are kept; a bulk load repeating a
    /// `(stream, sequence)` stores the later event but leaves the index
    /// pointing at the first.
    fn insert(&mut self, event: &Event) {
        self.sequences
            .entry(event.stream_id.clone())
            .or_default()
            .entry(event.sequence_number)
            .or_insert_with(|| event.event_id.clone());
        if let Some(key) = event.idempotency_key() {
            self.idempotency
                .entry((event.stream_id.clone(), key.to_string()))
                .or_insert_with(|| event.event_id.clone());
        }
        self.events.insert(event.event_id.clone(), event.clone());
    }

    fn resolve(&self, event_id: &str) -> Result<Event, StoreError> {
        self.events
            .get(event_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("event", event_id))
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Get the number of stored events
    pub fn event_count(&self) -> usize {
        self.read().map(|state| state.events.len()).unwrap_or(0)
    }

    /// Committed sequence numbers of a stream, ascending
    pub fn sequences(&self, stream_id: &str) -> Vec<i64> {
        self.read()
            .map(|state| {
                state
                    .sequences
                    .get(stream_id)
                    .map(|index| index.keys().copied().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Make the next `put_event` call fail with `error` (queued, FIFO)
    pub fn fail_next_put(&self, error: StoreError) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.put.push_back(error);
        }
    }

    /// Make the next read call (lookups, range scans, listings) fail with
    /// `error` (queued, FIFO)
    pub fn fail_next_query(&self, error: StoreError) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.query.push_back(error);
        }
    }

    /// Make the next `chunks` bulk chunk writes process only the first half
    /// of their items (rounded down)
    pub fn throttle_batch_writes(&self, chunks: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.throttled_batches = chunks;
        }
    }

    /// Clear all data and scripted faults (useful for test setup)
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.write() {
            *state = StoreState::default();
        }
        if let Ok(mut faults) = self.faults.lock() {
            *faults = Faults::default();
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Database("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Database("memory store lock poisoned".to_string()))
    }

    fn take_put_fault(&self) -> Option<StoreError> {
        self.faults.lock().ok().and_then(|mut faults| faults.put.pop_front())
    }

    fn take_query_fault(&self) -> Option<StoreError> {
        self.faults.lock().ok().and_then(|mut faults| faults.query.pop_front())
    }

    fn take_batch_throttle(&self) -> bool {
        match self.faults.lock() {
            Ok(mut faults) if faults.throttled_batches > 0 => {
                faults.throttled_batches -= 1;
                true
            }
            _ => false,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Bulk chunk writer
// =============================================================================

#[async_trait]
impl ChunkWriter for MemoryStore {
    async fn write_chunk(&self, mut chunk: Vec<Event>) -> Result<Vec<Event>, StoreError> {
        let unprocessed = if self.take_batch_throttle() {
            chunk.split_off(chunk.len() / 2)
        } else {
            Vec::new()
        };

        let mut state = self.write()?;
        for event in &chunk {
            state.insert(event);
        }
        Ok(unprocessed)
    }
}

// =============================================================================
// Event Store Implementation
// =============================================================================

#[async_trait]
impl EventStore for MemoryStore {
    async fn put_event(&self, event: &Event) -> Result<(), StoreError> {
        if let Some(error) = self.take_put_fault() {
            return Err(error);
        }

        let mut state = self.write()?;

        if let Some(key) = event.idempotency_key() {
            if state.idempotency.contains_key(&(event.stream_id.clone(), key.to_string())) {
                return Err(StoreError::idempotency_conflict(&event.stream_id, key));
            }
        }

        let sequence_taken = state
            .sequences
            .get(&event.stream_id)
            .is_some_and(|index| index.contains_key(&event.sequence_number));
        if sequence_taken || state.events.contains_key(&event.event_id) {
            return Err(StoreError::sequence_conflict(&event.stream_id, event.sequence_number));
        }

        state.insert(event);

        debug!(
            event_id = %event.event_id,
            stream_id = %event.stream_id,
            sequence = event.sequence_number,
            "Event committed"
        );

        Ok(())
    }

    async fn put_events_batch(
        &self,
        events: &[Event],
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        write_in_chunks(self, events, cancel).await
    }

    async fn get_by_event_id(&self, event_id: &str) -> Result<Event, StoreError> {
        if let Some(error) = self.take_query_fault() {
            return Err(error);
        }
        self.read()?.resolve(event_id)
    }

    async fn find_by_idempotency_key(
        &self,
        stream_id: &str,
        key: &str,
    ) -> Result<Event, StoreError> {
        if let Some(error) = self.take_query_fault() {
            return Err(error);
        }
        let state = self.read()?;
        let event_id = state
            .idempotency
            .get(&(stream_id.to_string(), key.to_string()))
            .ok_or_else(|| StoreError::not_found("idempotency_key", format!("{stream_id}#{key}")))?;
        state.resolve(event_id)
    }

    async fn get_latest_sequence(&self, stream_id: &str) -> Result<i64, StoreError> {
        if let Some(error) = self.take_query_fault() {
            return Err(error);
        }
        let state = self.read()?;
        Ok(state
            .sequences
            .get(stream_id)
            .and_then(|index| index.last_key_value())
            .map(|(seq, _)| *seq)
            .unwrap_or(0))
    }

    async fn query_by_stream(
        &self,
        stream_id: &str,
        from_sequence: i64,
        direction: Direction,
        limit: i32,
    ) -> Result<StreamPage, StoreError> {
        if let Some(error) = self.take_query_fault() {
            return Err(error);
        }

        let limit = clamp_limit(limit);
        let state = self.read()?;

        let Some(index) = state.sequences.get(stream_id) else {
            return Ok(StreamPage {
                events: Vec::new(),
                next_sequence: from_sequence,
                has_more: false,
            });
        };

        // One extra item tells us whether another page exists
        let ids: Vec<&String> = match direction {
            Direction::Forward => index.range(from_sequence..).map(|(_, id)| id).take(limit + 1).collect(),
            Direction::Backward => {
                index.range(..=from_sequence).rev().map(|(_, id)| id).take(limit + 1).collect()
            }
        };

        let has_more = ids.len() > limit;
        let events = ids
            .into_iter()
            .take(limit)
            .map(|id| state.resolve(id))
            .collect::<Result<Vec<_>, _>>()?;

        let next_sequence = events
            .last()
            .map(|event| direction.step(event.sequence_number))
            .unwrap_or(from_sequence);

        Ok(StreamPage {
            events,
            next_sequence,
            has_more,
        })
    }

    async fn list_streams(&self, limit: i32) -> Result<Vec<StreamSummary>, StoreError> {
        if let Some(error) = self.take_query_fault() {
            return Err(error);
        }
        let limit = if limit <= 0 { DEFAULT_STREAM_LIST_LIMIT } else { limit as usize };
        let state = self.read()?;

        let latest: BTreeMap<&String, i64> = state
            .sequences
            .iter()
            .filter_map(|(stream_id, index)| {
                index.last_key_value().map(|(seq, _)| (stream_id, *seq))
            })
            .collect();

        Ok(latest
            .into_iter()
            .take(limit)
            .map(|(stream_id, latest_sequence)| StreamSummary {
                stream_id: stream_id.clone(),
                latest_sequence,
            })
            .collect())
    }
}

// =============================================================================
// Tests
// =============================================================================
