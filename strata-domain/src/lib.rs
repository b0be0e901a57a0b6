//! Strata Domain Layer
//!
//! Pure domain types with zero I/O dependencies.
//! Contains the immutable event record, the pagination cursor codec,
//! and the small value objects shared by the store and the event log.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod cursor;
pub mod event;
pub mod value_objects;

// Re-export commonly used types
pub use cursor::{Cursor, CURSOR_DELIMITER};
pub use event::{sort_key, Event, NewEventInput};
pub use value_objects::{Direction, DomainError, ReplayRequest, StreamSummary};
