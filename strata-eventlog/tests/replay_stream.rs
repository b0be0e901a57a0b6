//! Replay over ingested history.

use std::sync::Arc;

use chrono::Duration;
use strata_domain::ReplayRequest;
use strata_eventlog::{collect, drain, EventInput, IngestService, ReplayEngine};
use strata_store::MemoryStore;
use strata_testkit::{event_input, seed_stream, t0};
use tokio_util::sync::CancellationToken;

fn at(event_type: &str, minutes: i64) -> EventInput {
    EventInput {
        occurred_at: Some(t0() + Duration::minutes(minutes)),
        ..event_input("orders-42", event_type)
    }
}

#[tokio::test]
async fn replay_applies_time_window_and_type_filter() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let ingest = IngestService::new(Arc::clone(&store));
    for input in [at("created", -1), at("created", 0), at("updated", 5), at("created", 10)] {
        ingest.ingest(input).await?;
    }

    let engine = ReplayEngine::new(store);
    let request = ReplayRequest::new("orders-42")
        .between(t0(), t0() + Duration::minutes(10))
        .types(["created"]);
    let (events, _errors) = engine.replay(request, CancellationToken::new());
    let replayed = collect(events).await;

    let times: Vec<_> = replayed.iter().map(|e| e.occurred_at).collect();
    assert_eq!(times, vec![t0(), t0() + Duration::minutes(10)]);
    assert!(replayed.iter().all(|e| e.event_type == "created"));
    Ok(())
}

#[tokio::test]
async fn replay_walks_every_page_of_a_long_stream() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let ingest = IngestService::new(Arc::clone(&store));
    seed_stream(&ingest, "metrics", "sampled", 230).await?;
    seed_stream(&ingest, "other", "sampled", 5).await?;

    let engine = ReplayEngine::new(store).with_default_page_size(40);
    let (events, errors) = engine.replay(ReplayRequest::new("metrics"), CancellationToken::new());

    assert_eq!(drain(events, errors).await?, 230);
    Ok(())
}

#[tokio::test]
async fn replay_cancelled_midway_stops_without_error() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let ingest = IngestService::new(Arc::clone(&store));
    seed_stream(&ingest, "metrics", "sampled", 300).await?;

    let engine = ReplayEngine::new(store);
    let cancel = CancellationToken::new();
    let (mut events, mut errors) = engine.replay(ReplayRequest::new("metrics"), cancel.clone());

    let mut received = Vec::new();
    while let Some(event) = events.recv().await {
        received.push(event.sequence_number);
        if received.len() == 10 {
            cancel.cancel();
        }
    }

    assert!(received.len() < 300);
    assert_eq!(received[..10], (1..=10).collect::<Vec<_>>()[..]);
    assert!(errors.recv().await.is_none());
    Ok(())
}
