//! Health check and general HTTP behaviour.

mod common;

use axum::http::StatusCode;
use common::{body_json, get};

#[tokio::test]
async fn health_without_workers_is_degraded() {
    let app = common::build_test_app(common::remote_state());
    let response = get(app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["workers_connected"], 0);
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn health_counts_local_ranks() {
    let dir = tempfile::tempdir().unwrap();
    let runner = std::sync::Arc::new(common::SlowRunner {
        delay: std::time::Duration::ZERO,
    });
    let app = common::build_test_app(common::local_state(2, runner, dir.path()));

    let json = body_json(get(app, "/health").await).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["workers_connected"], 2);
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let app = common::build_test_app(common::remote_state());
    let response = get(app, "/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let app = common::build_test_app(common::remote_state());
    let response = get(app, "/health").await;

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("Response must contain an x-request-id header");
    assert_eq!(request_id.to_str().unwrap().len(), 36);
}

#[tokio::test]
async fn workers_list_starts_empty() {
    let app = common::build_test_app(common::remote_state());
    let json = body_json(get(app, "/api/v1/workers").await).await;

    assert_eq!(json["data"], serde_json::json!([]));
}
