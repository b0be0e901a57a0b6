//! Builders and seeding helpers.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use strata_domain::{Event, NewEventInput};
use strata_eventlog::{EventInput, IngestService};
use strata_store::EventStore;

use crate::Result;

/// Fixed reference time used across tests (2024-01-15T10:00:00Z)
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Valid ingest input for `stream_id` of type `event_type` at [`t0`]
pub fn event_input(stream_id: &str, event_type: &str) -> EventInput {
    EventInput {
        stream_id: stream_id.to_string(),
        event_type: event_type.to_string(),
        payload: json!({"stream": stream_id, "type": event_type}),
        occurred_at: Some(t0()),
        ..EventInput::default()
    }
}

/// [`event_input`] carrying an idempotency key
pub fn keyed_input(stream_id: &str, event_type: &str, key: &str) -> EventInput {
    EventInput {
        idempotency_key: Some(key.to_string()),
        ..event_input(stream_id, event_type)
    }
}

/// Committed-shape event built directly, bypassing ingest.
///
/// The id is derived from stream and sequence so it is stable across runs.
pub fn event_at(
    stream_id: &str,
    sequence: i64,
    event_type: &str,
    occurred_at: DateTime<Utc>,
) -> Result<Event> {
    let event = Event::new(NewEventInput {
        event_id: format!("evt-{stream_id}-{sequence:06}"),
        stream_id: stream_id.to_string(),
        sequence_number: sequence,
        event_type: event_type.to_string(),
        payload: json!({"sequence": sequence}),
        occurred_at: Some(occurred_at),
        ingested_at: occurred_at,
        ..NewEventInput::default()
    })?;
    Ok(event)
}

/// Ingest `count` events of type `event_type` into `stream_id`.
///
/// Events are spaced one minute apart starting at [`t0`].
pub async fn seed_stream<S>(
    service: &IngestService<S>,
    stream_id: &str,
    event_type: &str,
    count: usize,
) -> Result<Vec<Event>>
where
    S: EventStore + ?Sized,
{
    let mut seeded = Vec::with_capacity(count);
    for i in 0..count {
        let input = EventInput {
            occurred_at: Some(t0() + chrono::Duration::minutes(i as i64)),
            payload: json!({"index": i}),
            ..event_input(stream_id, event_type)
        };
        let (event, _) = service.ingest(input).await?;
        seeded.push(event);
    }
    Ok(seeded)
}
