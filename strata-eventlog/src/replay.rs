//! Streaming replay
//!
//! A replay runs in its own task, paging forward through one stream and
//! pushing the events that pass the time and type filters into a bounded
//! channel. A slow consumer stalls the task rather than growing a buffer.
//! Cancelling the token stops the task at the next page boundary or send.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use strata_domain::{Direction, Event, ReplayRequest};
use strata_store::{EventStore, StoreError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::metrics::{EventLogMetrics, NoopMetrics};

/// Events fetched per store page when the request does not say
pub const DEFAULT_REPLAY_PAGE_SIZE: i32 = 100;

/// Capacity of the replay event channel
pub const REPLAY_CHANNEL_CAPACITY: usize = 100;

/// Compiled filters of one replay
#[derive(Debug, Clone)]
struct ReplayFilter {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    event_types: HashSet<String>,
}

impl ReplayFilter {
    fn new(request: &ReplayRequest) -> Self {
        Self {
            from: request.from,
            to: request.to,
            event_types: request.event_types.iter().cloned().collect(),
        }
    }

    /// Inclusive time window, then type allow-set (empty allows all)
    fn matches(&self, event: &Event) -> bool {
        if self.from.is_some_and(|from| event.occurred_at < from) {
            return false;
        }
        if self.to.is_some_and(|to| event.occurred_at > to) {
            return false;
        }
        self.event_types.is_empty() || self.event_types.contains(&event.event_type)
    }
}

/// Replays stream history onto channels
pub struct ReplayEngine<S: ?Sized> {
    store: Arc<S>,
    metrics: Arc<dyn EventLogMetrics>,
    default_page_size: i32,
}

impl<S: ?Sized> Clone for ReplayEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            metrics: Arc::clone(&self.metrics),
            default_page_size: self.default_page_size,
        }
    }
}

impl<S: EventStore + ?Sized + 'static> ReplayEngine<S> {
    /// Engine over `store` without metrics
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            metrics: Arc::new(NoopMetrics),
            default_page_size: DEFAULT_REPLAY_PAGE_SIZE,
        }
    }

    /// Replace the metrics sink
    pub fn with_metrics(mut self, metrics: Arc<dyn EventLogMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Page size used when a request leaves it unset (non-positive keeps
    /// the built-in default)
    pub fn with_default_page_size(mut self, page_size: i32) -> Self {
        if page_size > 0 {
            self.default_page_size = page_size;
        }
        self
    }

    /// Start replaying `request.stream_id` from sequence 1.
    ///
    /// Returns the event receiver and an error receiver. The error channel
    /// yields at most one error, when a page read fails. Both channels close
    /// once the task exits; cancellation closes them without an error.
    pub fn replay(
        &self,
        request: ReplayRequest,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<Event>, mpsc::Receiver<StoreError>) {
        let (events_tx, events_rx) = mpsc::channel(REPLAY_CHANNEL_CAPACITY);
        let (errors_tx, errors_rx) = mpsc::channel(1);

        let page_size = if request.page_size > 0 {
            request.page_size
        } else {
            self.default_page_size
        };
        let store = Arc::clone(&self.store);
        let metrics = Arc::clone(&self.metrics);

        let started = Instant::now();
        metrics.replay_started();

        tokio::spawn(async move {
            let filter = ReplayFilter::new(&request);
            let outcome = run_replay(
                store.as_ref(),
                metrics.as_ref(),
                &request.stream_id,
                &filter,
                page_size,
                &events_tx,
                &cancel,
            )
            .await;

            match outcome {
                Ok(emitted) => {
                    debug!(
                        stream_id = %request.stream_id,
                        emitted,
                        cancelled = cancel.is_cancelled(),
                        "Replay finished"
                    );
                }
                Err(err) => {
                    error!(stream_id = %request.stream_id, error = %err, "Replay aborted");
                    // Capacity 1 and a single send, so this never waits
                    let _ = errors_tx.send(err).await;
                }
            }

            metrics.replay_finished(started.elapsed());
            // events_tx and errors_tx drop here, closing both channels
        });

        (events_rx, errors_rx)
    }
}

async fn run_replay<S: EventStore + ?Sized>(
    store: &S,
    metrics: &dyn EventLogMetrics,
    stream_id: &str,
    filter: &ReplayFilter,
    page_size: i32,
    events: &mpsc::Sender<Event>,
    cancel: &CancellationToken,
) -> Result<usize, StoreError> {
    let mut sequence = 1;
    let mut emitted = 0;

    loop {
        if cancel.is_cancelled() {
            return Ok(emitted);
        }

        let page = store
            .query_by_stream(stream_id, sequence, Direction::Forward, page_size)
            .await?;

        for event in page.events {
            if !filter.matches(&event) {
                continue;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(emitted),
                sent = events.send(event) => {
                    if sent.is_err() {
                        // Consumer went away
                        return Ok(emitted);
                    }
                    emitted += 1;
                    metrics.replay_event_emitted();
                }
            }
        }

        if !page.has_more {
            return Ok(emitted);
        }
        sequence = page.next_sequence;
    }
}

/// Receive every replayed event, in order.
pub async fn collect(mut events: mpsc::Receiver<Event>) -> Vec<Event> {
    let mut collected = Vec::new();
    while let Some(event) = events.recv().await {
        collected.push(event);
    }
    collected
}

/// Consume a replay to completion, counting events.
///
/// # Errors
/// The store error that aborted the replay, if any.
pub async fn drain(
    mut events: mpsc::Receiver<Event>,
    mut errors: mpsc::Receiver<StoreError>,
) -> Result<usize, StoreError> {
    let mut count = 0;
    while events.recv().await.is_some() {
        count += 1;
    }
    match errors.recv().await {
        Some(err) => Err(err),
        None => Ok(count),
    }
}

// =============================================================================
// Tests
// =============================================================================
