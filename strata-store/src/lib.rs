//! Strata Storage Layer
//!
//! The storage collaborator behind ingest and replay.
//!
//! # Architecture
//!
//! - **`EventStore` trait**: the storage contract (conditional writes,
//!   point lookups, ordered range scans)
//! - **In-memory store**: fast implementation for tests and development
//! - **PostgreSQL store**: production implementation (feature `postgres`)
//!
//! # Usage
//!
//! ```rust
//! use chrono::Utc;
//! use strata_domain::{Direction, Event, NewEventInput};
//! use strata_store::{EventStore, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!
//!     let event = Event::new(NewEventInput {
//!         event_id: "01HN3XJQR6YQ0000000000000A".to_string(),
//!         stream_id: "orders-1".to_string(),
//!         sequence_number: 1,
//!         event_type: "order_created".to_string(),
//!         payload: serde_json::json!({"order_id": "o-1"}),
//!         occurred_at: Some(Utc::now()),
//!         ingested_at: Utc::now(),
//!         ..NewEventInput::default()
//!     })
//!     .unwrap();
//!     store.put_event(&event).await.unwrap();
//!
//!     let page = store.query_by_stream("orders-1", 1, Direction::Forward, 50).await.unwrap();
//!     println!("Events in page: {}", page.events.len());
//! }
//! ```

#![warn(clippy::all)]

// Modules
mod batch;
mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod repository;

// Re-exports
pub use batch::{BATCH_WRITE_BACKOFF_STEP, BATCH_WRITE_MAX_ATTEMPTS, BATCH_WRITE_MAX_ITEMS};
pub use error::StoreError;
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgEventStore;
pub use repository::{clamp_limit, EventStore, StreamPage, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
