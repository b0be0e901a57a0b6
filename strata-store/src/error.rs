//! Storage layer errors

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Debug, Error)]
pub enum StoreError {
    /// Point lookup found nothing
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        /// Type of entity (event, idempotency key)
        entity_type: String,
        /// Lookup key
        id: String,
    },

    /// Another writer already claimed this sequence number
    #[error("Sequence conflict: stream {stream_id} sequence {sequence}")]
    SequenceConflict {
        /// Stream being written
        stream_id: String,
        /// Sequence that was already claimed
        sequence: i64,
    },

    /// Another writer already claimed this idempotency key
    #[error("Idempotency conflict: stream {stream_id} key {key}")]
    IdempotencyConflict {
        /// Stream being written
        stream_id: String,
        /// Key that was already claimed
        key: String,
    },

    /// Bulk write gave up with items still unprocessed
    #[error("Batch write incomplete: {remaining} unprocessed items remain")]
    Unprocessed {
        /// Items that were never written
        remaining: usize,
    },

    /// Caller cancelled while the store was waiting
    #[error("Operation cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create a sequence conflict error
    pub fn sequence_conflict(stream_id: impl Into<String>, sequence: i64) -> Self {
        Self::SequenceConflict {
            stream_id: stream_id.into(),
            sequence,
        }
    }

    /// Create an idempotency conflict error
    pub fn idempotency_conflict(stream_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self::IdempotencyConflict {
            stream_id: stream_id.into(),
            key: key.into(),
        }
    }

    /// Whether this is a not-found outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound {
                entity_type: "unknown".to_string(),
                id: "unknown".to_string(),
            },
            _ => StoreError::Database(err.to_string()),
        }
    }
}
