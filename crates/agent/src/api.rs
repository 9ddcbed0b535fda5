//! HTTP API for health checks, Prometheus metrics, feed data and the
//! shared time window

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use monitor_lib::{
    feed::{FeedState, FeedStats},
    health::{ComponentStatus, HealthRegistry},
    models::{Sample, TimeRange},
    observability::MonitorMetrics,
    MonitoringContext,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: MonitorMetrics,
    pub context: MonitoringContext,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, context: MonitoringContext) -> Self {
        Self {
            health_registry,
            metrics: context.metrics.clone(),
            context,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn not_found(message: String) -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorBody { error: message })).into_response()
}

/// Returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %err, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn list_feeds(State(state): State<Arc<AppState>>) -> Json<Vec<FeedStats>> {
    Json(state.context.registry.stats_snapshot())
}

/// One feed with the samples a chart would draw right now
#[derive(Debug, Serialize)]
pub struct FeedDetail {
    pub stats: FeedStats,
    pub query: String,
    pub columns: Vec<String>,
    pub min: f64,
    pub max: f64,
    pub data: Option<monitor_lib::models::Observation>,
    pub feed_start_time: Option<DateTime<Utc>>,
    pub last_data_arrived: Option<DateTime<Utc>>,
    /// Range after reconciling with the shared time window
    pub display_range: Option<TimeRange>,
    pub samples: Vec<Sample>,
}

fn data_range(state: &FeedState) -> Option<TimeRange> {
    let first = state.samples.first()?;
    let last = state.samples.last()?;
    Some(TimeRange::new(first.timestamp, last.timestamp))
}

async fn get_feed(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let Some(feed) = state.context.registry.get_by_id(&id) else {
        return not_found(format!("no feed registered under {}", id));
    };

    let current = feed.current_state();
    let display_range =
        data_range(&current).map(|range| state.context.time_window.display_time_range(range));
    let samples = match display_range {
        Some(range) => current
            .samples
            .into_iter()
            .filter(|s| range.contains(s.timestamp))
            .collect(),
        None => Vec::new(),
    };

    Json(FeedDetail {
        stats: feed.stats(),
        query: feed.query().to_string(),
        columns: feed.columns().iter().map(|c| c.accessor.clone()).collect(),
        min: feed.min(&[]),
        max: feed.max(&[]),
        data: current.data,
        feed_start_time: current.feed_start_time,
        last_data_arrived: current.last_data_arrived,
        display_range,
        samples,
    })
    .into_response()
}

#[derive(Debug, Serialize)]
pub struct WindowResponse {
    pub window: Option<TimeRange>,
}

#[derive(Debug, Deserialize)]
pub struct WindowRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

async fn get_window(State(state): State<Arc<AppState>>) -> Json<WindowResponse> {
    Json(WindowResponse {
        window: state.context.time_window.get_time_window(),
    })
}

async fn set_window(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WindowRequest>,
) -> Json<WindowResponse> {
    let range = TimeRange::new(request.start, request.end);
    state.context.time_window.set_time_window(range);
    info!(start = %range.start, end = %range.end, "Time window set");
    Json(WindowResponse {
        window: Some(range),
    })
}

async fn clear_window(State(state): State<Arc<AppState>>) -> StatusCode {
    state.context.time_window.clear();
    StatusCode::NO_CONTENT
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/feeds", get(list_feeds))
        .route("/api/v1/feeds/:id", get(get_feed))
        .route(
            "/api/v1/window",
            get(get_window).put(set_window).delete(clear_window),
        )
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
