//! Integration tests for the monitor API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use cluster_monitor::api::{create_router, AppState};
use monitor_lib::{
    catalog::CatalogEntry,
    health::{components, HealthRegistry},
    member::{async_trait, ClusterMember},
    models::{DisplayColumn, Params, QueryResult, QueryValue, Record},
    observability::StructuredLogger,
    MonitoringContext, QueryError,
};
use std::sync::Arc;
use tower::ServiceExt;

/// Member that always answers with the same heap reading
struct StaticMember;

#[async_trait]
impl ClusterMember for StaticMember {
    fn address(&self) -> &str {
        "http://core-1:7474"
    }

    fn label(&self) -> &str {
        "core-1"
    }

    async fn run(&self, _query: &str, _params: &Params) -> Result<QueryResult, QueryError> {
        let mut record = Record::new();
        record.insert("used".to_string(), QueryValue::Integer(512));
        Ok(QueryResult::single(record))
    }
}

fn heap_entry() -> CatalogEntry {
    CatalogEntry::new(
        "heap",
        "RETURN 512 AS used",
        vec![DisplayColumn::new("Heap Used", "used")],
    )
}

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::FEEDS).await;
    health_registry.register(components::API).await;

    let members: Vec<Arc<dyn ClusterMember>> = vec![Arc::new(StaticMember)];
    let context = MonitoringContext::new(members, StructuredLogger::new("test"));
    let state = Arc::new(AppState::new(health_registry, context));
    let router = create_router(state.clone());

    (router, state)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

async fn send_json(
    app: Router,
    method: &str,
    uri: &str,
    body: serde_json::Value,
) -> axum::response::Response {
    app.oneshot(
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state) = setup_test_app().await;
    state
        .health_registry
        .set_degraded(components::FEEDS, "1 of 3 feeds failing")
        .await;

    let (status, health) = get_json(app, "/healthz").await;

    // Degraded is still operational
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(
        health["components"]["feeds"]["message"],
        "1 of 3 feeds failing"
    );
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;
    state
        .health_registry
        .set_unhealthy(components::FEEDS, "all 3 feeds are failing")
        .await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_ready_flag() {
    let (app, state) = setup_test_app().await;

    let (status, readiness) = get_json(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);

    state.health_registry.set_ready(true).await;
    let (status, readiness) = get_json(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_monitor_metrics() {
    let (app, _state) = setup_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("cluster_monitor_feeds_active"));
}

#[tokio::test]
async fn test_list_feeds() {
    let (app, state) = setup_test_app().await;
    let member = state.context.members[0].clone();
    let feed = state.context.feed_for(&member, &heap_entry()).unwrap();

    let (status, feeds) = get_json(app, "/api/v1/feeds").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(feeds.as_array().unwrap().len(), 1);
    assert_eq!(feeds[0]["id"], feed.key().id());
    assert_eq!(feeds[0]["label"], "core-1 heap");
    assert_eq!(feeds[0]["rate_ms"], 1000);
    state.context.registry.shutdown();
}

#[tokio::test]
async fn test_get_feed_returns_samples_and_extremes() {
    let (app, state) = setup_test_app().await;
    let member = state.context.members[0].clone();
    let feed = state.context.feed_for(&member, &heap_entry()).unwrap();
    feed.poll_once().await;

    let uri = format!("/api/v1/feeds/{}", feed.key().id());
    let (status, detail) = get_json(app, &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["data"]["used"], 512.0);
    assert_eq!(detail["min"], 512.0);
    assert_eq!(detail["max"], 512.0);
    assert_eq!(detail["columns"][0], "used");
    assert!(!detail["samples"].as_array().unwrap().is_empty());
    assert!(detail["display_range"].is_object());
    state.context.registry.shutdown();
}

#[tokio::test]
async fn test_get_feed_clears_stale_window() {
    let (app, state) = setup_test_app().await;
    let member = state.context.members[0].clone();
    let feed = state.context.feed_for(&member, &heap_entry()).unwrap();
    feed.poll_once().await;

    let response = send_json(
        app.clone(),
        "PUT",
        "/api/v1/window",
        serde_json::json!({
            "start": "2000-01-01T00:00:00Z",
            "end": "2000-01-01T00:05:00Z"
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let uri = format!("/api/v1/feeds/{}", feed.key().id());
    let (_, detail) = get_json(app.clone(), &uri).await;
    assert!(!detail["samples"].as_array().unwrap().is_empty());

    // Disjoint from live data, so the stored window is dropped
    let (_, window) = get_json(app, "/api/v1/window").await;
    assert!(window["window"].is_null());
    state.context.registry.shutdown();
}

#[tokio::test]
async fn test_get_unknown_feed_returns_404() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get_json(app, "/api/v1/feeds/ffffffffffffffff").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("ffffffffffffffff"));
}

#[tokio::test]
async fn test_window_set_get_clear() {
    let (app, _state) = setup_test_app().await;

    let (_, window) = get_json(app.clone(), "/api/v1/window").await;
    assert!(window["window"].is_null());

    // Reversed bounds are swapped
    let response = send_json(
        app.clone(),
        "PUT",
        "/api/v1/window",
        serde_json::json!({
            "start": "2024-05-01T10:05:00Z",
            "end": "2024-05-01T10:00:00Z"
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let (_, window) = get_json(app.clone(), "/api/v1/window").await;
    assert_eq!(window["window"]["start"], "2024-05-01T10:00:00Z");
    assert_eq!(window["window"]["end"], "2024-05-01T10:05:00Z");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/v1/window")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (_, window) = get_json(app, "/api/v1/window").await;
    assert!(window["window"].is_null());
}

#[tokio::test]
async fn test_window_rejects_malformed_body() {
    let (app, _state) = setup_test_app().await;

    let response = send_json(
        app,
        "PUT",
        "/api/v1/window",
        serde_json::json!({ "start": "yesterday" }),
    )
    .await;

    assert!(response.status().is_client_error());
}
