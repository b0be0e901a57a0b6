//! Ingest errors

use strata_domain::DomainError;
use strata_store::StoreError;
use thiserror::Error;

use crate::ids::IdError;

/// Errors returned by the ingest service
#[derive(Debug, Error)]
pub enum IngestError {
    /// Input failed validation; nothing was written
    #[error("Validation error: {0}")]
    Validation(String),

    /// Store failure that ingest does not absorb
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The event id generator failed
    #[error(transparent)]
    IdentifierGeneration(#[from] IdError),

    /// Lost an idempotency race but the winner could not be read back
    #[error("Idempotency conflict on stream {stream_id} key {key} could not be resolved")]
    IdempotencyUnresolved {
        /// Stream being written
        stream_id: String,
        /// Contested key
        key: String,
    },

    /// Every claim attempt lost a sequence race
    #[error("Max retries reached for sequence assignment on stream {stream_id} after {attempts} attempts")]
    MaxRetries {
        /// Stream being written
        stream_id: String,
        /// Attempts made
        attempts: u32,
    },
}

impl IngestError {
    /// Whether the caller sent bad input
    pub fn is_validation(&self) -> bool {
        matches!(self, IngestError::Validation(_))
    }
}

impl From<DomainError> for IngestError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(message) => IngestError::Validation(message),
        }
    }
}
