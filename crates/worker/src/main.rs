//! `vidgen-worker` -- one rank of a distributed video-generation group.
//!
//! Two modes:
//!
//! - `vidgen-worker <request.json>` runs a single job and exits 0 on
//!   completion, 1 on any error.
//! - `vidgen-worker` connects to the gateway (`GATEWAY_WS_URL`) and runs
//!   every request the gateway broadcasts, one at a time.
//!
//! Configuration is read from the environment; see [`WorkerConfig`],
//! [`DistributedConfig`] and `vidgen_storage::S3Config` for the variables.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vidgen_collective::{DistributedConfig, DistributedContext};
use vidgen_core::protocol::WorkerMessage;
use vidgen_core::task::GenerationRequest;
use vidgen_events::{ProgressReporter, TracingReporter};
use vidgen_pipeline::ModelRunner;
use vidgen_storage::{store_from_env, ArtifactStore};
use vidgen_worker::session::{self, Outbox};
use vidgen_worker::{executor, launcher, RankWorker, WorkerConfig};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vidgen_worker=info,vidgen_collective=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = ?e, "Worker exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env()?;
    let dist_config = DistributedConfig::from_env()?;
    let request_path = std::env::args().nth(1);

    tracing::info!(
        rank = dist_config.rank,
        world_size = dist_config.world_size,
        local_rank = dist_config.local_rank,
        model_command = %config.model_command,
        "Starting vidgen-worker",
    );

    // Held until exit; dropping the handles kills the children.
    let _children = if config.launch_local_ranks && dist_config.rank == 0 && dist_config.world_size > 1 {
        launcher::spawn_local_ranks(&dist_config).context("spawning local ranks")?
    } else {
        Vec::new()
    };

    if dist_config.rank == 0 {
        tokio::fs::create_dir_all(&config.output_dir)
            .await
            .with_context(|| format!("creating output directory {}", config.output_dir.display()))?;
    }

    let dist = DistributedContext::join(dist_config).await?;
    let runner: Arc<dyn ModelRunner> = config.runner();
    let store = store_from_env().await;

    match request_path {
        Some(path) => run_once(&config, dist, runner, store, &path).await,
        None => serve(&config, dist, runner, store).await,
    }
}

/// Run the job described by the JSON file at `path`, then leave the group.
async fn run_once(
    config: &WorkerConfig,
    dist: DistributedContext,
    runner: Arc<dyn ModelRunner>,
    store: Arc<dyn ArtifactStore>,
    path: &str,
) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading request file {path}"))?;
    let request: GenerationRequest =
        serde_json::from_str(&raw).with_context(|| format!("parsing request file {path}"))?;

    let (reporter, forwarder) = match (&config.gateway_ws_url, dist.is_coordinator()) {
        (Some(url), true) => {
            let register = register_message(config, &dist, true);
            session::open_progress_channel(url, register).await
        }
        _ => (Arc::new(TracingReporter) as Arc<dyn ProgressReporter>, None),
    };

    let worker = RankWorker::new(dist.clone(), runner, store, reporter, config.output_dir.clone());
    let outcome = worker.run_task(request).await;
    drop(worker);

    if let Some(forwarder) = forwarder {
        let _ = forwarder.await;
    }

    match &outcome {
        Err(e) if e.is_fatal() => {}
        _ => dist.teardown().await?,
    }

    if let Some(result) = outcome? {
        tracing::info!(
            task_id = %result.task_id,
            url = %result.url,
            seed = result.seed,
            model = result.model,
            "Video ready",
        );
    }
    Ok(())
}

/// Take work from the gateway until shutdown or a broken group.
async fn serve(
    config: &WorkerConfig,
    dist: DistributedContext,
    runner: Arc<dyn ModelRunner>,
    store: Arc<dyn ArtifactStore>,
) -> anyhow::Result<()> {
    let url = config
        .gateway_ws_url
        .clone()
        .context("GATEWAY_WS_URL is required when no request file is given")?;

    let outbox = Outbox::new();
    let reporter: Arc<dyn ProgressReporter> = Arc::new(outbox.reporter());
    let register = register_message(config, &dist, false);
    let worker = RankWorker::new(dist, runner, store, reporter, config.output_dir.clone());

    let (tasks_tx, tasks_rx) = mpsc::unbounded_channel();
    let session_handle = tokio::spawn(async move {
        session::run(&url, register, outbox, tasks_tx).await;
    });

    let result = executor::run_until(worker, tasks_rx, shutdown_signal())
        .await
        .map_err(anyhow::Error::from);

    session_handle.abort();
    tracing::info!("Worker stopped");
    result
}

fn register_message(config: &WorkerConfig, dist: &DistributedContext, observer: bool) -> WorkerMessage {
    WorkerMessage::Register {
        rank: dist.rank(),
        world_size: dist.world_size(),
        worker_name: config.worker_name_for(dist.rank()),
        observer,
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
