//! Value Objects for the Strata Domain
//!
//! Small immutable types shared across the store, the event log and the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Domain errors raised while constructing or decoding domain values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Malformed or incomplete input
    #[error("Validation error: {0}")]
    Validation(String),
}

impl DomainError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

// =============================================================================
// Direction
// =============================================================================

/// Scan direction over a stream's sequence index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Ascending sequence order
    #[default]
    Forward,
    /// Descending sequence order
    Backward,
}

impl Direction {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }

    /// Sequence that follows `seq` when scanning in this direction
    pub fn step(&self, seq: i64) -> i64 {
        match self {
            Direction::Forward => seq + 1,
            Direction::Backward => seq - 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward" => Ok(Direction::Forward),
            "backward" => Ok(Direction::Backward),
            other => Err(DomainError::validation(format!(
                "invalid direction: {other}. Expected: forward, backward"
            ))),
        }
    }
}

// =============================================================================
// Stream summary
// =============================================================================

/// Latest committed sequence of a stream, as seen by administrative listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSummary {
    /// Stream identifier
    pub stream_id: String,
    /// Highest committed sequence number
    pub latest_sequence: i64,
}

// =============================================================================
// Replay request
// =============================================================================

/// Parameters of a filtered replay over one stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayRequest {
    /// Stream to replay
    pub stream_id: String,

    /// Lower bound on `occurred_at` (inclusive)
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,

    /// Upper bound on `occurred_at` (inclusive)
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,

    /// Allowed event types; empty matches every type
    #[serde(default)]
    pub event_types: Vec<String>,

    /// Events fetched per store page; non-positive selects the default
    #[serde(default)]
    pub page_size: i32,
}

impl ReplayRequest {
    /// Replay of a whole stream with default paging
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            ..Self::default()
        }
    }

    /// Restrict to a time window (both bounds inclusive)
    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    /// Restrict to the given event types
    pub fn types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.event_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Set page size
    pub fn page_size(mut self, page_size: i32) -> Self {
        self.page_size = page_size;
        self
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_parse() {
        assert_eq!("forward".parse::<Direction>().unwrap(), Direction::Forward);
        assert_eq!("backward".parse::<Direction>().unwrap(), Direction::Backward);
        assert!("sideways".parse::<Direction>().is_err());
        assert!("Forward".parse::<Direction>().is_err());
    }

    #[test]
    fn test_direction_step() {
        assert_eq!(Direction::Forward.step(7), 8);
        assert_eq!(Direction::Backward.step(7), 6);
    }

    #[test]
    fn test_direction_serde_lowercase() {
        let json = serde_json::to_string(&Direction::Backward).unwrap();
        assert_eq!(json, "\"backward\"");
    }

    #[test]
    fn test_replay_request_defaults_from_json() {
        let req: ReplayRequest = serde_json::from_str(r#"{"stream_id":"orders-1"}"#).unwrap();

        assert_eq!(req.stream_id, "orders-1");
        assert!(req.from.is_none());
        assert!(req.to.is_none());
        assert!(req.event_types.is_empty());
        assert_eq!(req.page_size, 0);
    }
}
