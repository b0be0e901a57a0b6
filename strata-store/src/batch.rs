//! Chunked bulk writes with bounded retry of unprocessed items.

use std::time::Duration;

use async_trait::async_trait;
use strata_domain::Event;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Largest chunk sent to the backend in one bulk request
pub const BATCH_WRITE_MAX_ITEMS: usize = 25;

/// Bulk requests attempted per chunk before giving up
pub const BATCH_WRITE_MAX_ATTEMPTS: u32 = 5;

/// Backoff after attempt `n` is `n * BATCH_WRITE_BACKOFF_STEP`
pub const BATCH_WRITE_BACKOFF_STEP: Duration = Duration::from_millis(25);

/// Backend half of a bulk write.
#[async_trait]
pub(crate) trait ChunkWriter: Send + Sync {
    /// Write one chunk, returning the items the backend did not process.
    async fn write_chunk(&self, chunk: Vec<Event>) -> Result<Vec<Event>, StoreError>;
}

/// Drive `writer` over `events` in chunks of at most [`BATCH_WRITE_MAX_ITEMS`].
pub(crate) async fn write_in_chunks<W>(
    writer: &W,
    events: &[Event],
    cancel: &CancellationToken,
) -> Result<(), StoreError>
where
    W: ChunkWriter + ?Sized,
{
    for (index, chunk) in events.chunks(BATCH_WRITE_MAX_ITEMS).enumerate() {
        let mut pending = chunk.to_vec();

        for attempt in 1..=BATCH_WRITE_MAX_ATTEMPTS {
            pending = writer.write_chunk(pending).await?;
            if pending.is_empty() || attempt == BATCH_WRITE_MAX_ATTEMPTS {
                break;
            }

            warn!(
                chunk = index,
                attempt,
                unprocessed = pending.len(),
                "Batch write left unprocessed items, backing off"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(StoreError::Cancelled),
                _ = tokio::time::sleep(BATCH_WRITE_BACKOFF_STEP * attempt) => {}
            }
        }

        if !pending.is_empty() {
            return Err(StoreError::Unprocessed {
                remaining: pending.len(),
            });
        }

        debug!(chunk = index, items = chunk.len(), "Batch chunk written");
    }

    Ok(())
}
