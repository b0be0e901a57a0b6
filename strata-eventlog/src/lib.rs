//! Strata Event Log
//!
//! The write and read paths on top of an [`strata_store::EventStore`]:
//! - Ingest with store-resolved sequence claims and bounded retry
//! - At-most-once recording via per-stream idempotency keys
//! - Filtered, cancellable, backpressured replay
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::Utc;
//! use strata_eventlog::{EventInput, IngestService};
//! use strata_store::MemoryStore;
//!
//! # async fn example() -> Result<(), strata_eventlog::IngestError> {
//! let store = Arc::new(MemoryStore::new());
//! let ingest = IngestService::new(store);
//!
//! let (event, created) = ingest
//!     .ingest(EventInput {
//!         stream_id: "orders-42".to_string(),
//!         event_type: "order_created".to_string(),
//!         payload: serde_json::json!({"order_id": "o-1"}),
//!         occurred_at: Some(Utc::now()),
//!         ..EventInput::default()
//!     })
//!     .await?;
//!
//! assert!(created);
//! assert_eq!(event.sequence_number, 1);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod idempotency;
pub mod ids;
pub mod ingest;
pub mod metrics;
pub mod replay;
pub mod validate;

pub use error::IngestError;
pub use idempotency::IdempotencyChecker;
pub use ids::{Clock, FixedClock, IdError, IdGenerator, SystemClock, UlidGenerator};
pub use ingest::{BatchResult, BatchStatus, IngestService, MAX_CLAIM_ATTEMPTS};
pub use metrics::{EventLogMetrics, IngestStatus, NoopMetrics};
pub use replay::{
    collect, drain, ReplayEngine, REPLAY_CHANNEL_CAPACITY, DEFAULT_REPLAY_PAGE_SIZE,
};
pub use validate::{validate_event_input, EventInput};
