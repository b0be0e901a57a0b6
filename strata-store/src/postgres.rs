//! PostgreSQL event store.
//!
//! The conditional write runs in one transaction: the idempotency claim is
//! inserted first (so its failure takes precedence), then the sequence claim,
//! then the event row. Each claim uses `ON CONFLICT DO NOTHING` and a zero
//! row count means the precondition failed.
//!
//! This module uses dynamic queries (sqlx::query) instead of compile-time
//! checked macros (sqlx::query!) to allow compilation without DATABASE_URL.

use crate::batch::{write_in_chunks, ChunkWriter};
use crate::error::StoreError;
use crate::repository::{clamp_limit, EventStore, StreamPage, DEFAULT_STREAM_LIST_LIMIT};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use std::collections::BTreeMap;
use strata_domain::{Direction, Event, StreamSummary};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const EVENT_COLUMNS: &str = "event_id, sort_key, stream_id, sequence_number, event_type, payload, \
     metadata, idempotency_key, occurred_at, ingested_at, schema_version";

/// PostgreSQL implementation of [`EventStore`]
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// Wrap an existing connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url`
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Apply the schema migrations shipped with the workspace
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Get a reference to the underlying pool (for testing).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Database row mapping
#[derive(sqlx::FromRow)]
struct EventRow {
    event_id: String,
    sort_key: String,
    stream_id: String,
    sequence_number: i64,
    event_type: String,
    payload: serde_json::Value,
    metadata: Json<BTreeMap<String, String>>,
    idempotency_key: Option<String>,
    occurred_at: DateTime<Utc>,
    ingested_at: DateTime<Utc>,
    schema_version: i32,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Self {
            event_id: row.event_id,
            sort_key: row.sort_key,
            stream_id: row.stream_id,
            sequence_number: row.sequence_number,
            event_type: row.event_type,
            payload: row.payload,
            metadata: row.metadata.0,
            idempotency_key: row.idempotency_key,
            occurred_at: row.occurred_at,
            ingested_at: row.ingested_at,
            schema_version: row.schema_version,
        }
    }
}

async fn insert_event_row(conn: &mut PgConnection, event: &Event) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO events (
            event_id, sort_key, stream_id, sequence_number, event_type, payload,
            metadata, idempotency_key, occurred_at, ingested_at, schema_version
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (event_id) DO NOTHING
        "#,
    )
    .bind(&event.event_id)
    .bind(&event.sort_key)
    .bind(&event.stream_id)
    .bind(event.sequence_number)
    .bind(&event.event_type)
    .bind(&event.payload)
    .bind(Json(&event.metadata))
    .bind(event.idempotency_key())
    .bind(event.occurred_at)
    .bind(event.ingested_at)
    .bind(event.schema_version)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

async fn claim_sequence(conn: &mut PgConnection, event: &Event) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO sequence_claims (stream_id, sequence_number, event_id) VALUES ($1, $2, $3) \
         ON CONFLICT DO NOTHING",
    )
    .bind(&event.stream_id)
    .bind(event.sequence_number)
    .bind(&event.event_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

async fn claim_idempotency_key(
    conn: &mut PgConnection,
    event: &Event,
    key: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO idempotency_claims (stream_id, idempotency_key, event_id) VALUES ($1, $2, $3) \
         ON CONFLICT DO NOTHING",
    )
    .bind(&event.stream_id)
    .bind(key)
    .bind(&event.event_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Bulk chunk writer
// =============================================================================

#[async_trait]
impl ChunkWriter for PgEventStore {
    async fn write_chunk(&self, chunk: Vec<Event>) -> Result<Vec<Event>, StoreError> {
        let mut tx = self.pool.begin().await?;
        for event in &chunk {
            insert_event_row(&mut *tx, event).await?;
            claim_sequence(&mut *tx, event).await?;
            if let Some(key) = event.idempotency_key() {
                claim_idempotency_key(&mut *tx, event, key).await?;
            }
        }
        tx.commit().await?;
        Ok(Vec::new())
    }
}

// =============================================================================
// Event Store Implementation
// =============================================================================

#[async_trait]
impl EventStore for PgEventStore {
    async fn put_event(&self, event: &Event) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        if let Some(key) = event.idempotency_key() {
            if claim_idempotency_key(&mut *tx, event, key).await? == 0 {
                tx.rollback().await?;
                return Err(StoreError::idempotency_conflict(&event.stream_id, key));
            }
        }

        if claim_sequence(&mut *tx, event).await? == 0 || insert_event_row(&mut *tx, event).await? == 0
        {
            tx.rollback().await?;
            return Err(StoreError::sequence_conflict(&event.stream_id, event.sequence_number));
        }

        tx.commit().await?;

        debug!(
            event_id = %event.event_id,
            stream_id = %event.stream_id,
            sequence = event.sequence_number,
            "Event committed"
        );

        Ok(())
    }

    async fn put_events_batch(
        &self,
        events: &[Event],
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        write_in_chunks(self, events, cancel).await
    }

    async fn get_by_event_id(&self, event_id: &str) -> Result<Event, StoreError> {
        let query = format!("SELECT {EVENT_COLUMNS} FROM events WHERE event_id = $1");
        let row = sqlx::query_as::<_, EventRow>(&query)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Into::into).ok_or_else(|| StoreError::not_found("event", event_id))
    }

    async fn find_by_idempotency_key(
        &self,
        stream_id: &str,
        key: &str,
    ) -> Result<Event, StoreError> {
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE event_id = (\
                 SELECT event_id FROM idempotency_claims \
                 WHERE stream_id = $1 AND idempotency_key = $2)"
        );
        let row = sqlx::query_as::<_, EventRow>(&query)
            .bind(stream_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Into::into)
            .ok_or_else(|| StoreError::not_found("idempotency_key", format!("{stream_id}#{key}")))
    }

    async fn get_latest_sequence(&self, stream_id: &str) -> Result<i64, StoreError> {
        let latest: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sequence_number) FROM events WHERE stream_id = $1")
                .bind(stream_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(latest.unwrap_or(0))
    }

    async fn query_by_stream(
        &self,
        stream_id: &str,
        from_sequence: i64,
        direction: Direction,
        limit: i32,
    ) -> Result<StreamPage, StoreError> {
        let limit = clamp_limit(limit);
        let (operator, order) = match direction {
            Direction::Forward => (">=", "ASC"),
            Direction::Backward => ("<=", "DESC"),
        };
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE stream_id = $1 AND sequence_number {operator} $2 \
             ORDER BY sequence_number {order} LIMIT $3"
        );

        // One extra row tells us whether another page exists
        let mut rows = sqlx::query_as::<_, EventRow>(&query)
            .bind(stream_id)
            .bind(from_sequence)
            .bind(limit as i64 + 1)
            .fetch_all(&self.pool)
            .await?;

        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let events: Vec<Event> = rows.into_iter().map(Into::into).collect();

        let next_sequence = events
            .last()
            .map(|event| direction.step(event.sequence_number))
            .unwrap_or(from_sequence);

        Ok(StreamPage {
            events,
            next_sequence,
            has_more,
        })
    }

    async fn list_streams(&self, limit: i32) -> Result<Vec<StreamSummary>, StoreError> {
        let limit = if limit <= 0 { DEFAULT_STREAM_LIST_LIMIT as i64 } else { limit as i64 };
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT stream_id, MAX(sequence_number) FROM events \
             GROUP BY stream_id ORDER BY stream_id LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(stream_id, latest_sequence)| StreamSummary {
                stream_id,
                latest_sequence,
            })
            .collect())
    }
}
