//! Idempotency lookup
//!
//! Resolves a `(stream, key)` pair to the event that already owns it.
//! Keys are caller-supplied and scoped to their stream.

use std::sync::Arc;

use strata_domain::Event;
use strata_store::{EventStore, StoreError};

/// Looks up events by idempotency key
pub struct IdempotencyChecker<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for IdempotencyChecker<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: EventStore + ?Sized> IdempotencyChecker<S> {
    /// Create a checker over `store`
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Event already recorded under `key` in `stream_id`, if any.
    ///
    /// An empty key never matches and does not touch the store.
    pub async fn find_existing(
        &self,
        stream_id: &str,
        key: &str,
    ) -> Result<Option<Event>, StoreError> {
        if key.is_empty() {
            return Ok(None);
        }

        match self.store.find_by_idempotency_key(stream_id, key).await {
            Ok(event) => Ok(Some(event)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }
}
