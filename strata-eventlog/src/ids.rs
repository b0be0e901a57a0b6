//! Clock and event identifier ports
//!
//! Ingest reads time and mints event ids through these traits so tests can
//! pin both.

use std::sync::Mutex;
use std::time::SystemTime;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use ulid::Generator;

// =============================================================================
// Clock
// =============================================================================

/// Source of the current UTC time
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct FixedClock {
    current: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Clock frozen at `at`
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(at),
        }
    }

    /// Jump to `at`
    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut current) = self.current.lock() {
            *current = at;
        }
    }

    /// Move forward by `by`
    pub fn advance(&self, by: Duration) {
        if let Ok(mut current) = self.current.lock() {
            *current += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.current.lock() {
            Ok(current) => *current,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

// =============================================================================
// Identifier generation
// =============================================================================

/// Event id generation failed
#[derive(Debug, Error)]
#[error("Generate event id: {0}")]
pub struct IdError(pub String);

/// Mints globally unique, time-sortable event ids
pub trait IdGenerator: Send + Sync {
    /// New id whose time component is `at`
    fn next_id(&self, at: DateTime<Utc>) -> Result<String, IdError>;
}

/// ULID generator, monotonic within a millisecond
pub struct UlidGenerator {
    inner: Mutex<Generator>,
}

impl UlidGenerator {
    /// Create a generator
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Generator::new()),
        }
    }
}

impl Default for UlidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for UlidGenerator {
    fn next_id(&self, at: DateTime<Utc>) -> Result<String, IdError> {
        let mut generator = self
            .inner
            .lock()
            .map_err(|_| IdError("generator lock poisoned".to_string()))?;

        generator
            .generate_from_datetime(SystemTime::from(at))
            .map(|id| id.to_string())
            .map_err(|e| IdError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_clock_moves_only_when_told() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let clock = FixedClock::new(start);

        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), start + Duration::minutes(5));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_ulids_are_monotonic_within_a_millisecond() {
        let generator = UlidGenerator::new();
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();

        let ids: Vec<String> = (0..100).map(|_| generator.next_id(at).unwrap()).collect();

        assert!(ids.iter().all(|id| id.len() == 26));
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_ulid_time_component_follows_clock() {
        let generator = UlidGenerator::new();
        let earlier = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let later = earlier + Duration::seconds(1);

        let first = generator.next_id(earlier).unwrap();
        let second = generator.next_id(later).unwrap();

        // 10-char timestamp prefix
        assert!(first[..10] < second[..10]);
        assert_eq!(
            ulid::Ulid::from_string(&second).unwrap().timestamp_ms(),
            later.timestamp_millis() as u64
        );
    }
}
