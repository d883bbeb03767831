#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use vidgen_collective::DistributedConfig;
use vidgen_core::dispatch::{DispatchAck, WorkerGroup};
use vidgen_core::error::CoreError;
use vidgen_core::task::GenerationRequest;
use vidgen_events::ProgressStream;
use vidgen_pipeline::{GeneratedVideo, GenerationError, ModelRunner, PipelineInvocation};
use vidgen_storage::LocalOnlyStore;
use vidgen_worker::LocalWorkerGroup;

use vidgen_api::config::{ServerConfig, WorkerMode};
use vidgen_api::routes;
use vidgen_api::state::AppState;
use vidgen_api::ws::WorkerRegistry;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        worker_mode: WorkerMode::Remote,
        local_world_size: 1,
        progress_retention: 1024,
    }
}

/// State whose dispatcher is the worker registry (remote mode).
pub fn remote_state() -> AppState {
    let registry = Arc::new(WorkerRegistry::new());
    AppState {
        config: Arc::new(test_config()),
        dispatcher: Arc::clone(&registry) as Arc<dyn WorkerGroup>,
        registry,
        progress: Arc::new(ProgressStream::default()),
    }
}

/// State with an arbitrary dispatcher.
pub fn state_with(dispatcher: Arc<dyn WorkerGroup>, progress: Arc<ProgressStream>) -> AppState {
    AppState {
        config: Arc::new(test_config()),
        dispatcher,
        registry: Arc::new(WorkerRegistry::new()),
        progress,
    }
}

/// State backed by an in-process group running `runner`.
pub fn local_state(world_size: u32, runner: Arc<dyn ModelRunner>, output_dir: &std::path::Path) -> AppState {
    let progress = Arc::new(ProgressStream::default());
    let group = LocalWorkerGroup::spawn(
        world_size,
        runner,
        Arc::new(LocalOnlyStore),
        Arc::clone(&progress) as _,
        output_dir,
    );
    state_with(Arc::new(group), progress)
}

/// Build the full application router with all middleware layers.
///
/// Mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack production uses.
pub fn build_test_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Records triggers without running anything.
#[derive(Default)]
pub struct RecordingGroup {
    pub triggered: Mutex<Vec<GenerationRequest>>,
}

#[async_trait]
impl WorkerGroup for RecordingGroup {
    async fn trigger(&self, request: GenerationRequest) -> Result<DispatchAck, CoreError> {
        self.triggered.lock().unwrap().push(request);
        Ok(DispatchAck::Queued)
    }

    fn ranks_available(&self) -> usize {
        1
    }
}

/// Sleeps for `delay`, then writes a small file on rank 0.
pub struct SlowRunner {
    pub delay: Duration,
}

#[async_trait]
impl ModelRunner for SlowRunner {
    async fn run(
        &self,
        invocation: &PipelineInvocation,
        dist: &DistributedConfig,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<Option<GeneratedVideo>, GenerationError> {
        tokio::time::sleep(self.delay).await;
        on_progress(100);
        if dist.rank != 0 {
            return Ok(None);
        }
        tokio::fs::write(&invocation.save_file, b"video").await?;
        Ok(Some(GeneratedVideo {
            path: invocation.save_file.clone(),
            frames: None,
        }))
    }
}
