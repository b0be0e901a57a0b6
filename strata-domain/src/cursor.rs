//! Pagination cursor
//!
//! Opaque, URL-safe token carrying a stream, a resume position and a scan
//! direction. The codec is purely syntactic: it never checks that the stream
//! or sequence exists.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use crate::value_objects::{Direction, DomainError};

/// Field separator inside a decoded cursor; stream ids must not contain it
pub const CURSOR_DELIMITER: char = ':';

/// Resume point for a paginated stream read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    /// Stream being paged
    pub stream_id: String,
    /// Next sequence to read
    pub sequence: i64,
    /// Scan direction
    pub direction: Direction,
}

impl Cursor {
    /// Create a cursor
    pub fn new(stream_id: impl Into<String>, sequence: i64, direction: Direction) -> Self {
        Self {
            stream_id: stream_id.into(),
            sequence,
            direction,
        }
    }

    /// Encode as an opaque token
    pub fn encode(&self) -> String {
        let raw = format!(
            "{}{CURSOR_DELIMITER}{}{CURSOR_DELIMITER}{}",
            self.stream_id, self.sequence, self.direction
        );
        URL_SAFE_NO_PAD.encode(raw.as_bytes())
    }

    /// Decode a token produced by [`Cursor::encode`].
    ///
    /// The payload must split into exactly three fields, so a stream id
    /// containing the delimiter does not round-trip.
    ///
    /// # Errors
    /// Returns `DomainError::Validation` for non-base64 input, a payload that
    /// does not hold exactly three fields, a non-integer sequence, or an
    /// unknown direction.
    pub fn decode(token: &str) -> Result<Self, DomainError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| DomainError::validation(format!("decode cursor base64: {e}")))?;
        let raw = String::from_utf8(bytes)
            .map_err(|_| DomainError::validation("cursor is not valid UTF-8"))?;

        let parts: Vec<&str> = raw.split(CURSOR_DELIMITER).collect();
        let [stream_id, sequence, direction] = parts.as_slice() else {
            return Err(DomainError::validation("invalid cursor format"));
        };

        let sequence = sequence
            .parse::<i64>()
            .map_err(|e| DomainError::validation(format!("parse cursor sequence: {e}")))?;
        let direction = direction
            .parse::<Direction>()
            .map_err(|_| DomainError::validation("invalid cursor direction"))?;

        Ok(Self {
            stream_id: stream_id.to_string(),
            sequence,
            direction,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
