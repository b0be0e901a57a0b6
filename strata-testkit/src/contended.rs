//! Store wrapper that loses races on purpose.
//!
//! Before forwarding a `put_event`, [`ContendedStore`] commits a scripted
//! rival write through the inner store. The rival takes the candidate's
//! sequence number (and, for [`Rival::Idempotency`], its idempotency key),
//! so the candidate's conditional write fails exactly as it would under a
//! real concurrent writer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use strata_domain::{Direction, Event, NewEventInput, StreamSummary};
use strata_store::{EventStore, StoreError, StreamPage};
use tokio_util::sync::CancellationToken;

/// A write committed ahead of the next candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rival {
    /// Claims the candidate's sequence number
    Sequence,
    /// Claims the candidate's sequence number and idempotency key
    Idempotency,
}

/// [`EventStore`] wrapper that injects rival writers
pub struct ContendedStore<S> {
    inner: Arc<S>,
    rivals: Mutex<VecDeque<Rival>>,
    committed: Mutex<Vec<Event>>,
}

impl<S: EventStore> ContendedStore<S> {
    /// Wrap `inner` with no rivals scheduled
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            rivals: Mutex::new(VecDeque::new()),
            committed: Mutex::new(Vec::new()),
        }
    }

    /// Schedule `rival` ahead of the next candidate write (FIFO)
    pub fn push_rival(&self, rival: Rival) {
        if let Ok(mut rivals) = self.rivals.lock() {
            rivals.push_back(rival);
        }
    }

    /// Schedule `count` sequence rivals
    pub fn contend_sequence(&self, count: usize) {
        for _ in 0..count {
            self.push_rival(Rival::Sequence);
        }
    }

    /// Rival events committed so far
    pub fn rivals_committed(&self) -> Vec<Event> {
        self.committed.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// The wrapped store
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    fn next_rival(&self) -> Option<Rival> {
        self.rivals.lock().ok().and_then(|mut rivals| rivals.pop_front())
    }

    fn rival_event(&self, rival: Rival, candidate: &Event) -> Result<Event, StoreError> {
        let n = self.committed.lock().map(|c| c.len()).unwrap_or(0);
        let idempotency_key = match rival {
            Rival::Sequence => None,
            Rival::Idempotency => candidate.idempotency_key.clone(),
        };

        Event::new(NewEventInput {
            event_id: format!("rival-{}-{n}", candidate.event_id),
            stream_id: candidate.stream_id.clone(),
            sequence_number: candidate.sequence_number,
            event_type: candidate.event_type.clone(),
            payload: json!({"rival": n}),
            metadata: Default::default(),
            idempotency_key,
            occurred_at: Some(candidate.occurred_at),
            ingested_at: candidate.ingested_at,
            schema_version: candidate.schema_version,
        })
        .map_err(|e| StoreError::Database(e.to_string()))
    }
}

#[async_trait]
impl<S: EventStore> EventStore for ContendedStore<S> {
    async fn put_event(&self, event: &Event) -> Result<(), StoreError> {
        if let Some(rival) = self.next_rival() {
            let rival_event = self.rival_event(rival, event)?;
            self.inner.put_event(&rival_event).await?;
            if let Ok(mut committed) = self.committed.lock() {
                committed.push(rival_event);
            }
        }
        self.inner.put_event(event).await
    }

    async fn put_events_batch(
        &self,
        events: &[Event],
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        self.inner.put_events_batch(events, cancel).await
    }

    async fn get_by_event_id(&self, event_id: &str) -> Result<Event, StoreError> {
        self.inner.get_by_event_id(event_id).await
    }

    async fn find_by_idempotency_key(
        &self,
        stream_id: &str,
        key: &str,
    ) -> Result<Event, StoreError> {
        self.inner.find_by_idempotency_key(stream_id, key).await
    }

    async fn get_latest_sequence(&self, stream_id: &str) -> Result<i64, StoreError> {
        self.inner.get_latest_sequence(stream_id).await
    }

    async fn query_by_stream(
        &self,
        stream_id: &str,
        from_sequence: i64,
        direction: Direction,
        limit: i32,
    ) -> Result<StreamPage, StoreError> {
        self.inner
            .query_by_stream(stream_id, from_sequence, direction, limit)
            .await
    }

    async fn list_streams(&self, limit: i32) -> Result<Vec<StreamSummary>, StoreError> {
        self.inner.list_streams(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::{event_at, t0};
    use strata_store::MemoryStore;

    #[tokio::test]
    async fn test_rival_takes_candidate_sequence() {
        let store = ContendedStore::new(Arc::new(MemoryStore::new()));
        store.push_rival(Rival::Sequence);

        let candidate = event_at("s-1", 1, "created", t0()).unwrap();
        let err = store.put_event(&candidate).await.unwrap_err();

        assert!(matches!(err, StoreError::SequenceConflict { sequence: 1, .. }));
        assert_eq!(store.rivals_committed().len(), 1);
        assert_eq!(store.inner().sequences("s-1"), vec![1]);
    }

    #[tokio::test]
    async fn test_without_rivals_writes_pass_through() {
        let store = ContendedStore::new(Arc::new(MemoryStore::new()));

        let candidate = event_at("s-1", 1, "created", t0()).unwrap();
        store.put_event(&candidate).await.unwrap();

        assert_eq!(store.get_by_event_id(&candidate.event_id).await.unwrap(), candidate);
        assert!(store.rivals_committed().is_empty());
    }
}
