//! Prometheus metrics.
//!
//! All collectors live in a private [`Registry`] so several daemons (and
//! tests) can coexist in one process.

use std::time::Duration;

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use strata_eventlog::{EventLogMetrics, IngestStatus};

use crate::error::DaemonResult;

/// Ingest latency buckets (seconds): 1ms to 2.5s
const INGEST_LATENCY_BUCKETS: &[f64] =
    &[0.001, 0.0025, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5];

/// Replay duration buckets (seconds): 10ms to 5min
const REPLAY_DURATION_BUCKETS: &[f64] = &[0.010, 0.050, 0.100, 0.500, 1.0, 5.0, 15.0, 60.0, 300.0];

/// Event store metrics.
pub struct PrometheusMetrics {
    registry: Registry,

    /// Ingest calls by outcome - labels: status
    pub events_ingested_total: IntCounterVec,

    /// Successful ingest latency
    pub ingest_duration_seconds: Histogram,

    /// Replays currently running
    pub active_replays: IntGauge,

    /// Events delivered by replays
    pub replay_events_total: IntCounter,

    /// Replay wall time
    pub replay_duration_seconds: Histogram,
}

impl PrometheusMetrics {
    /// Create and register all collectors.
    pub fn new() -> DaemonResult<Self> {
        let registry = Registry::new();

        let events_ingested_total = IntCounterVec::new(
            Opts::new("strata_events_ingested_total", "Total ingest calls by outcome"),
            &["status"],
        )?;
        let ingest_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "strata_ingest_duration_seconds",
                "Ingest duration in seconds",
            )
            .buckets(INGEST_LATENCY_BUCKETS.to_vec()),
        )?;
        let active_replays =
            IntGauge::new("strata_active_replays", "Current number of running replays")?;
        let replay_events_total =
            IntCounter::new("strata_replay_events_total", "Total events emitted by replays")?;
        let replay_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "strata_replay_duration_seconds",
                "Replay duration in seconds",
            )
            .buckets(REPLAY_DURATION_BUCKETS.to_vec()),
        )?;

        registry.register(Box::new(events_ingested_total.clone()))?;
        registry.register(Box::new(ingest_duration_seconds.clone()))?;
        registry.register(Box::new(active_replays.clone()))?;
        registry.register(Box::new(replay_events_total.clone()))?;
        registry.register(Box::new(replay_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            events_ingested_total,
            ingest_duration_seconds,
            active_replays,
            replay_events_total,
            replay_duration_seconds,
        })
    }

    /// Prometheus text exposition of every collector.
    pub fn render(&self) -> DaemonResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl EventLogMetrics for PrometheusMetrics {
    fn record_ingest(&self, _stream_id: &str, _event_type: &str, status: IngestStatus) {
        // Stream and type stay out of the labels to bound cardinality
        self.events_ingested_total
            .with_label_values(&[status.as_str()])
            .inc();
    }

    fn observe_ingest_duration(&self, duration: Duration) {
        self.ingest_duration_seconds.observe(duration.as_secs_f64());
    }

    fn replay_started(&self) {
        self.active_replays.inc();
    }

    fn replay_event_emitted(&self) {
        self.replay_events_total.inc();
    }

    fn replay_finished(&self, duration: Duration) {
        self.active_replays.dec();
        self.replay_duration_seconds.observe(duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = PrometheusMetrics::new().unwrap();
        let rendered = metrics.render().unwrap();

        assert!(rendered.contains("strata_active_replays"));
        assert!(rendered.contains("strata_replay_events_total"));
    }

    #[test]
    fn test_two_registries_coexist() {
        assert!(PrometheusMetrics::new().is_ok());
        assert!(PrometheusMetrics::new().is_ok());
    }

    #[test]
    fn test_ingest_hooks() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.record_ingest("s-1", "created", IngestStatus::Created);
        metrics.record_ingest("s-1", "created", IngestStatus::Created);
        metrics.record_ingest("s-1", "created", IngestStatus::Duplicate);
        metrics.observe_ingest_duration(Duration::from_millis(3));

        assert_eq!(
            metrics.events_ingested_total.with_label_values(&["created"]).get(),
            2
        );
        assert_eq!(
            metrics.events_ingested_total.with_label_values(&["duplicate"]).get(),
            1
        );
        assert_eq!(metrics.ingest_duration_seconds.get_sample_count(), 1);
        assert!(metrics
            .render()
            .unwrap()
            .contains(r#"strata_events_ingested_total{status="created"} 2"#));
    }

    #[test]
    fn test_replay_hooks_balance_the_gauge() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.replay_started();
        metrics.replay_started();
        metrics.replay_event_emitted();
        metrics.replay_finished(Duration::from_millis(40));

        assert_eq!(metrics.active_replays.get(), 1);
        assert_eq!(metrics.replay_events_total.get(), 1);
        assert_eq!(metrics.replay_duration_seconds.get_sample_count(), 1);
    }
}
