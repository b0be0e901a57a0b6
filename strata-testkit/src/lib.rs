//! Test helpers for Strata crates.
//!
//! Provides input builders, stream seeding, and a store wrapper that makes
//! concurrent-writer races reproducible.

mod contended;
mod helpers;

pub use contended::{ContendedStore, Rival};
pub use helpers::{event_at, event_input, keyed_input, seed_stream, t0};

/// Result type used by the seeding helpers
pub type Result<T> = anyhow::Result<T>;
