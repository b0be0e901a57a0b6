//! HTTP API for the Strata daemon.
//!
//! Two routers, served on separate listeners:
//! - Public (`/api/v1`): ingest, batch ingest, event lookup, stream reads
//! - Admin (`/admin`): health, readiness, metrics, stream listing, replay
//!
//! Every error body has the shape `{"error": {"code": ..., "message": ...}}`.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderValue, Request, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};
use ulid::Ulid;

use strata_domain::{Cursor, Direction, Event, ReplayRequest, StreamSummary};
use strata_eventlog::{drain, BatchResult, EventInput, IngestError, IngestService, ReplayEngine};
use strata_store::{EventStore, StoreError};

use crate::config::IngestConfig;
use crate::metrics::PrometheusMetrics;

/// Stream probed by the health and readiness checks
const PROBE_STREAM: &str = "health-probe-stream";

/// Streams returned by the admin listing
const ADMIN_STREAM_LIST_LIMIT: i32 = 200;

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState<S: EventStore + 'static> {
    pub store: Arc<S>,
    pub ingest: IngestService<S>,
    pub replay: ReplayEngine<S>,
    pub metrics: Arc<PrometheusMetrics>,
    pub max_batch_size: usize,
}

impl<S: EventStore + 'static> ApiState<S> {
    /// Wire the ingest service and replay engine over `store`, both reporting
    /// into `metrics`.
    pub fn new(store: Arc<S>, metrics: Arc<PrometheusMetrics>, config: &IngestConfig) -> Self {
        let ingest = IngestService::new(Arc::clone(&store)).with_metrics(metrics.clone());
        let replay = ReplayEngine::new(Arc::clone(&store))
            .with_metrics(metrics.clone())
            .with_default_page_size(config.replay_page_size);

        Self {
            store,
            ingest,
            replay,
            metrics,
            max_batch_size: config.max_batch_size,
        }
    }
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Probe response (admin health and readiness).
#[derive(Debug, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub status: String,
}

/// Single ingest response.
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub event: Event,
    pub created: bool,
}

/// Batch ingest response.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<BatchResult>,
}

/// Event lookup response.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventResponse {
    pub event: Event,
}

/// Stream read query string.
#[derive(Debug, Default, Deserialize)]
pub struct StreamEventsQuery {
    pub limit: Option<String>,
    pub direction: Option<String>,
    pub cursor: Option<String>,
}

/// Stream read response.
#[derive(Debug, Serialize, Deserialize)]
pub struct StreamEventsResponse {
    pub events: Vec<Event>,
    pub next_cursor: String,
    pub has_more: bool,
}

/// Admin stream listing.
#[derive(Debug, Serialize, Deserialize)]
pub struct StreamsResponse {
    pub streams: Vec<StreamSummary>,
}

/// Admin replay result.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReplayResponse {
    pub status: String,
    pub events_replayed: usize,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Machine-readable code plus a human message.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

// =============================================================================
// Routers
// =============================================================================

/// Create the public API router.
pub fn create_public_router<S>(state: Arc<ApiState<S>>) -> Router
where
    S: EventStore + 'static,
{
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/events", post(ingest_handler::<S>))
        .route("/api/v1/events/batch", post(batch_ingest_handler::<S>))
        .route("/api/v1/events/:event_id", get(get_event_handler::<S>))
        .route("/api/v1/streams/:stream_id/events", get(stream_events_handler::<S>));

    with_http_layers(router).with_state(state)
}

/// Create the admin API router.
pub fn create_admin_router<S>(state: Arc<ApiState<S>>) -> Router
where
    S: EventStore + 'static,
{
    let router = Router::new()
        .route("/admin/health", get(admin_health_handler::<S>))
        .route("/admin/ready", get(ready_handler::<S>))
        .route("/admin/metrics", get(metrics_handler::<S>))
        .route("/admin/streams", get(list_streams_handler::<S>))
        .route("/admin/replay", post(replay_handler::<S>));

    with_http_layers(router).with_state(state)
}

/// Request id (ULID, `x-request-id`) and request tracing.
fn with_http_layers<S>(router: Router<Arc<ApiState<S>>>) -> Router<Arc<ApiState<S>>>
where
    S: EventStore + 'static,
{
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUlid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id()),
    )
}

#[derive(Debug, Clone, Copy, Default)]
struct MakeRequestUlid;

impl MakeRequestId for MakeRequestUlid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Ulid::new().to_string())
            .ok()
            .map(RequestId::new)
    }
}

// =============================================================================
// Public Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Ingest one event. 201 when created, 200 for an idempotent duplicate.
async fn ingest_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    payload: Result<Json<EventInput>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError>
where
    S: EventStore + 'static,
{
    let Json(input) = payload.map_err(|e| bad_request("invalid_request", e.body_text()))?;

    let (event, created) = state.ingest.ingest(input).await.map_err(ingest_error)?;

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(IngestResponse { event, created })))
}

/// Ingest a batch of events.
async fn batch_ingest_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    payload: Result<Json<Vec<EventInput>>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError>
where
    S: EventStore + 'static,
{
    let Json(inputs) = payload.map_err(|e| bad_request("invalid_request", e.body_text()))?;

    if inputs.is_empty() || inputs.len() > state.max_batch_size {
        return Err(bad_request(
            "invalid_batch_size",
            format!("batch size must be between 1 and {}", state.max_batch_size),
        ));
    }

    let results = state.ingest.batch_ingest(inputs).await;
    Ok(Json(BatchResponse { results }))
}

/// Look up one event by id.
async fn get_event_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    Path(event_id): Path<String>,
) -> Result<Json<EventResponse>, ApiError>
where
    S: EventStore + 'static,
{
    match state.store.get_by_event_id(&event_id).await {
        Ok(event) => Ok(Json(EventResponse { event })),
        Err(e) if e.is_not_found() => Err(not_found("event_not_found", "event not found")),
        Err(e) => {
            error!(error = %e, event_id = %event_id, "Event lookup failed");
            Err(internal("event_fetch_failed", "failed to fetch event"))
        }
    }
}

/// Page through a stream.
///
/// A cursor, when given, must belong to the path stream and overrides the
/// `direction` parameter.
async fn stream_events_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    Path(stream_id): Path<String>,
    query: Result<Query<StreamEventsQuery>, QueryRejection>,
) -> Result<Json<StreamEventsResponse>, ApiError>
where
    S: EventStore + 'static,
{
    let Query(params) = query.map_err(|e| bad_request("invalid_request", e.body_text()))?;

    let limit = match params.limit.as_deref().filter(|raw| !raw.is_empty()) {
        Some(raw) => raw
            .parse::<i32>()
            .map_err(|_| bad_request("invalid_limit", "limit must be a valid integer"))?,
        None => 0,
    };

    let mut direction = match params.direction.as_deref() {
        Some(raw) => raw.parse::<Direction>().map_err(|_| {
            bad_request("invalid_direction", "direction must be forward or backward")
        })?,
        None => Direction::Forward,
    };

    let from_sequence = match params.cursor.as_deref().filter(|raw| !raw.is_empty()) {
        Some(token) => {
            let cursor =
                Cursor::decode(token).map_err(|e| bad_request("invalid_cursor", e.to_string()))?;
            if cursor.stream_id != stream_id {
                return Err(bad_request(
                    "invalid_cursor",
                    "cursor stream_id does not match request stream_id",
                ));
            }
            direction = cursor.direction;
            cursor.sequence.max(1)
        }
        None => match direction {
            Direction::Forward => 1,
            Direction::Backward => state
                .store
                .get_latest_sequence(&stream_id)
                .await
                .map_err(|e| stream_query_error(&stream_id, e))?,
        },
    };

    let page = state
        .store
        .query_by_stream(&stream_id, from_sequence, direction, limit)
        .await
        .map_err(|e| stream_query_error(&stream_id, e))?;

    let next_cursor = if page.has_more {
        Cursor::new(stream_id, page.next_sequence, direction).encode()
    } else {
        String::new()
    };

    Ok(Json(StreamEventsResponse {
        events: page.events,
        next_cursor,
        has_more: page.has_more,
    }))
}

// =============================================================================
// Admin Handlers
// =============================================================================

/// Liveness with a store probe. Always 200; a failed probe reports `degraded`.
async fn admin_health_handler<S>(State(state): State<Arc<ApiState<S>>>) -> Json<ProbeResponse>
where
    S: EventStore + 'static,
{
    let status = match state.store.get_latest_sequence(PROBE_STREAM).await {
        Ok(_) => "ok",
        Err(e) => {
            warn!(error = %e, "Store probe failed");
            "degraded"
        }
    };
    Json(ProbeResponse {
        status: status.to_string(),
    })
}

/// Readiness: 503 until the store answers.
async fn ready_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
) -> (StatusCode, Json<ProbeResponse>)
where
    S: EventStore + 'static,
{
    match state.store.get_latest_sequence(PROBE_STREAM).await {
        Ok(_) => (
            StatusCode::OK,
            Json(ProbeResponse {
                status: "ready".to_string(),
            }),
        ),
        Err(e) => {
            warn!(error = %e, "Readiness probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ProbeResponse {
                    status: "not_ready".to_string(),
                }),
            )
        }
    }
}

/// Prometheus text exposition.
async fn metrics_handler<S>(State(state): State<Arc<ApiState<S>>>) -> impl IntoResponse
where
    S: EventStore + 'static,
{
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        ),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Known streams with their latest sequence.
async fn list_streams_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
) -> Result<Json<StreamsResponse>, ApiError>
where
    S: EventStore + 'static,
{
    let streams = state
        .store
        .list_streams(ADMIN_STREAM_LIST_LIMIT)
        .await
        .map_err(|e| {
            error!(error = %e, "Stream listing failed");
            internal("list_streams_failed", e.to_string())
        })?;

    Ok(Json(StreamsResponse { streams }))
}

/// Run a replay to completion and report how many events it emitted.
///
/// The replay is cancelled if the request is dropped before it finishes.
async fn replay_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    payload: Result<Json<ReplayRequest>, JsonRejection>,
) -> Result<Json<ReplayResponse>, ApiError>
where
    S: EventStore + 'static,
{
    let Json(request) = payload.map_err(|e| bad_request("invalid_request", e.body_text()))?;
    if request.stream_id.is_empty() {
        return Err(bad_request("validation_failed", "stream_id is required"));
    }

    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let stream_id = request.stream_id.clone();
    let (events, errors) = state.replay.replay(request, cancel);

    match drain(events, errors).await {
        Ok(events_replayed) => Ok(Json(ReplayResponse {
            status: "completed".to_string(),
            events_replayed,
        })),
        Err(e) => {
            error!(error = %e, stream_id = %stream_id, "Replay failed");
            Err(internal("replay_failed", e.to_string()))
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message: message.into(),
            },
        }),
    )
}

fn bad_request(code: &str, message: impl Into<String>) -> ApiError {
    error_response(StatusCode::BAD_REQUEST, code, message)
}

fn not_found(code: &str, message: impl Into<String>) -> ApiError {
    error_response(StatusCode::NOT_FOUND, code, message)
}

fn internal(code: &str, message: impl Into<String>) -> ApiError {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, code, message)
}

fn ingest_error(error: IngestError) -> ApiError {
    match error {
        IngestError::Validation(message) => bad_request("validation_failed", message),
        other => {
            error!(error = %other, "Ingest failed");
            internal("ingest_failed", "failed to ingest event")
        }
    }
}

fn stream_query_error(stream_id: &str, error: StoreError) -> ApiError {
    error!(error = %error, stream_id = %stream_id, "Stream query failed");
    internal("stream_query_failed", "failed to query stream events")
}

// =============================================================================
// Tests
// =============================================================================
