//! PostgreSQL store against a live database.
//!
//! Run with `DATABASE_URL=... cargo test -p strata-store --features postgres -- --ignored`.

#![cfg(feature = "postgres")]

use chrono::Utc;
use sqlx::PgPool;
use strata_domain::{Direction, Event, NewEventInput};
use strata_store::{EventStore, PgEventStore, StoreError};
use tokio_util::sync::CancellationToken;

fn event(stream_id: &str, sequence: i64, key: Option<&str>) -> Event {
    Event::new(NewEventInput {
        event_id: format!("evt-{stream_id}-{sequence:04}"),
        stream_id: stream_id.to_string(),
        sequence_number: sequence,
        event_type: "created".to_string(),
        payload: serde_json::json!({"sequence": sequence}),
        idempotency_key: key.map(str::to_string),
        occurred_at: Some(Utc::now()),
        ingested_at: Utc::now(),
        ..NewEventInput::default()
    })
    .unwrap()
}

#[sqlx::test(migrations = "../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_put_claims_sequence_and_key(pool: PgPool) {
    let store = PgEventStore::new(pool);

    store.put_event(&event("orders-1", 1, Some("k-1"))).await.unwrap();

    let err = store.put_event(&event("orders-1", 1, None)).await.unwrap_err();
    assert!(matches!(err, StoreError::SequenceConflict { sequence: 1, .. }));

    let err = store
        .put_event(&event("orders-1", 2, Some("k-1")))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::IdempotencyConflict { .. }));

    // Failed claims leave nothing behind
    assert_eq!(store.get_latest_sequence("orders-1").await.unwrap(), 1);
    let found = store
        .find_by_idempotency_key("orders-1", "k-1")
        .await
        .unwrap();
    assert_eq!(found.sequence_number, 1);
}

#[sqlx::test(migrations = "../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_range_scans_page_both_ways(pool: PgPool) {
    let store = PgEventStore::new(pool);
    let events: Vec<Event> = (1..=5).map(|seq| event("orders-1", seq, None)).collect();
    store
        .put_events_batch(&events, &CancellationToken::new())
        .await
        .unwrap();

    let page = store
        .query_by_stream("orders-1", 1, Direction::Forward, 2)
        .await
        .unwrap();
    let seqs: Vec<i64> = page.events.iter().map(|e| e.sequence_number).collect();
    assert_eq!(seqs, vec![1, 2]);
    assert_eq!(page.next_sequence, 3);
    assert!(page.has_more);

    let page = store
        .query_by_stream("orders-1", 5, Direction::Backward, 10)
        .await
        .unwrap();
    let seqs: Vec<i64> = page.events.iter().map(|e| e.sequence_number).collect();
    assert_eq!(seqs, vec![5, 4, 3, 2, 1]);
    assert!(!page.has_more);

    let fetched = store.get_by_event_id(&events[2].event_id).await.unwrap();
    assert_eq!(fetched.payload, events[2].payload);
    assert!(store.get_by_event_id("missing").await.unwrap_err().is_not_found());
}

#[sqlx::test(migrations = "../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_list_streams_reports_latest(pool: PgPool) {
    let store = PgEventStore::new(pool);
    for seq in 1..=3 {
        store.put_event(&event("a", seq, None)).await.unwrap();
    }
    store.put_event(&event("b", 1, None)).await.unwrap();

    let mut streams = store.list_streams(10).await.unwrap();
    streams.sort_by(|x, y| x.stream_id.cmp(&y.stream_id));

    let latest: Vec<(String, i64)> = streams
        .into_iter()
        .map(|s| (s.stream_id, s.latest_sequence))
        .collect();
    assert_eq!(latest, vec![("a".to_string(), 3), ("b".to_string(), 1)]);
}
