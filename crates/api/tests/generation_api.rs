//! Generation intake and progress polling over HTTP.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use common::{body_json, get, post_json, RecordingGroup, SlowRunner};
use serde_json::json;
use vidgen_core::progress::ProgressStatus;
use vidgen_core::types::TaskId;
use vidgen_events::{ProgressStream, TaskHandle};

#[tokio::test]
async fn bogus_task_is_501_without_dispatch_or_progress() {
    let group = Arc::new(RecordingGroup::default());
    let progress = Arc::new(ProgressStream::default());
    let app = common::build_test_app(common::state_with(group.clone(), Arc::clone(&progress)));

    let response = post_json(app, "/api/v1/generate", json!({"task": "bogus", "prompt": "x"})).await;

    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "NOT_IMPLEMENTED");
    assert!(group.triggered.lock().unwrap().is_empty());
    assert!(progress.is_empty());
}

#[tokio::test]
async fn i2v_without_image_is_400() {
    let group = Arc::new(RecordingGroup::default());
    let app = common::build_test_app(common::state_with(
        group.clone(),
        Arc::new(ProgressStream::default()),
    ));

    let response = post_json(
        app,
        "/api/v1/generate",
        json!({"task": "i2v-A14B", "prompt": "a cat"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
    assert!(group.triggered.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_model_is_400() {
    let app = common::build_test_app(common::state_with(
        Arc::new(RecordingGroup::default()),
        Arc::new(ProgressStream::default()),
    ));

    let response = post_json(app, "/api/v1/generate", json!({"task": "t2v-XL", "prompt": "x"})).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "UNSUPPORTED_TASK");
}

#[tokio::test]
async fn malformed_body_is_400() {
    let app = common::build_test_app(common::remote_state());

    let response = post_json(app, "/api/v1/generate", json!({"task": 42})).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn no_connected_workers_is_503() {
    let app = common::build_test_app(common::remote_state());

    let response = post_json(app, "/api/v1/generate", json!({"task": "t2v", "prompt": "a cat"})).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["status"], "error");
}

#[tokio::test]
async fn accepted_request_is_queued_with_fresh_id() {
    let group = Arc::new(RecordingGroup::default());
    let app = common::build_test_app(common::state_with(
        group.clone(),
        Arc::new(ProgressStream::default()),
    ));

    let response = post_json(app, "/api/v1/generate", json!({"task": "t2v", "prompt": "a cat"})).await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "task_queued");
    let task_id = body["task_id"].as_str().unwrap();

    let triggered = group.triggered.lock().unwrap();
    assert_eq!(triggered.len(), 1);
    assert_eq!(triggered[0].task_id, Some(TaskId::from(task_id)));
}

#[tokio::test]
async fn caller_task_id_is_echoed_and_dispatched() {
    let group = Arc::new(RecordingGroup::default());
    let app = common::build_test_app(common::state_with(
        group.clone(),
        Arc::new(ProgressStream::default()),
    ));

    let response = post_json(
        app,
        "/api/v1/generate",
        json!({"task": "t2v", "prompt": "a cat", "task_id": "caller-42"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await["task_id"], "caller-42");
    let triggered = group.triggered.lock().unwrap();
    assert_eq!(triggered[0].task_id, Some(TaskId::from("caller-42")));
}

#[tokio::test]
async fn t2v_end_to_end_on_local_group() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(SlowRunner {
        delay: Duration::from_millis(300),
    });
    let state = common::local_state(1, runner, dir.path());
    let progress = Arc::clone(&state.progress);
    let app = common::build_test_app(state);

    let response = post_json(
        app.clone(),
        "/api/v1/generate",
        json!({"task": "t2v", "prompt": "a cat", "num_frames": 16}),
    )
    .await;

    // The response arrives while the model is still running.
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "task_started");
    let task_id = TaskId::from(body["task_id"].as_str().unwrap());
    assert!(progress
        .records_for(&task_id)
        .iter()
        .all(|r| !r.status.is_terminal()));

    let handle = TaskHandle::new(task_id.clone(), Arc::clone(&progress));
    let terminal = handle
        .wait_for_terminal(Duration::from_secs(10))
        .await
        .expect("task should finish");
    assert_eq!(terminal.status, ProgressStatus::Completed);

    let uri = format!("/api/v1/tasks/{task_id}/progress");
    let records = body_json(get(app.clone(), &uri).await).await["data"].clone();
    let statuses: Vec<&str> = records
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses.first(), Some(&"STARTED"));
    assert!(statuses.contains(&"GENERATING_VIDEO"));
    assert_eq!(statuses.last(), Some(&"COMPLETED"));

    let latest = body_json(get(app, &format!("/api/v1/tasks/{task_id}")).await).await;
    assert_eq!(latest["data"]["status"], "COMPLETED");
    assert_eq!(latest["data"]["progress"], 100);
    assert!(latest["data"]["url"].as_str().unwrap().ends_with(".mp4"));
}

#[tokio::test]
async fn unknown_task_lookup() {
    let app = common::build_test_app(common::remote_state());

    let response = get(app.clone(), "/api/v1/tasks/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(app, "/api/v1/tasks/nope/progress").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"], json!([]));
}
