//! Worker process configuration.
//!
//! # Environment variables
//!
//! | Variable             | Default        | Description                                          |
//! |----------------------|----------------|------------------------------------------------------|
//! | `GATEWAY_WS_URL`     | unset          | Gateway worker socket, e.g. `ws://host:3000/api/v1/workers/ws` |
//! | `WORKER_NAME`        | `rank-<RANK>`  | Name reported to the gateway                         |
//! | `MODEL_COMMAND`      | `vidgen-model` | Executable that runs the model                       |
//! | `MODEL_ARGS`         | empty          | Whitespace-separated arguments for `MODEL_COMMAND`   |
//! | `MODEL_TIMEOUT_SECS` | unset          | Kill the model process after this many seconds       |
//! | `MODEL_WORKDIR`      | unset          | Working directory of the model process               |
//! | `OUTPUT_DIR`         | `./outputs`    | Directory rank 0 writes videos to                    |
//! | `LAUNCH_LOCAL_RANKS` | `false`        | Rank 0 spawns ranks `1..WORLD_SIZE` on this host     |

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use vidgen_pipeline::SubprocessRunner;

use crate::error::WorkerError;

pub const DEFAULT_MODEL_COMMAND: &str = "vidgen-model";
pub const DEFAULT_OUTPUT_DIR: &str = "./outputs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub gateway_ws_url: Option<String>,
    pub worker_name: Option<String>,
    pub model_command: String,
    pub model_args: Vec<String>,
    pub model_timeout: Option<Duration>,
    pub model_workdir: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub launch_local_ranks: bool,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, WorkerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, WorkerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let model_timeout = match non_empty("MODEL_TIMEOUT_SECS") {
            None => None,
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    WorkerError::Config(format!("MODEL_TIMEOUT_SECS must be an integer, got '{raw}'"))
                })?;
                Some(Duration::from_secs(secs))
            }
        };

        let launch_local_ranks = match non_empty("LAUNCH_LOCAL_RANKS").as_deref().map(str::trim) {
            None | Some("0" | "false" | "no") => false,
            Some("1" | "true" | "yes") => true,
            Some(other) => {
                return Err(WorkerError::Config(format!(
                    "LAUNCH_LOCAL_RANKS must be true or false, got '{other}'"
                )))
            }
        };

        Ok(Self {
            gateway_ws_url: non_empty("GATEWAY_WS_URL"),
            worker_name: non_empty("WORKER_NAME"),
            model_command: non_empty("MODEL_COMMAND")
                .unwrap_or_else(|| DEFAULT_MODEL_COMMAND.to_string()),
            model_args: non_empty("MODEL_ARGS")
                .map(|raw| raw.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            model_timeout,
            model_workdir: non_empty("MODEL_WORKDIR").map(PathBuf::from),
            output_dir: non_empty("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            launch_local_ranks,
        })
    }

    /// Name reported to the gateway for `rank`.
    pub fn worker_name_for(&self, rank: u32) -> String {
        self.worker_name
            .clone()
            .unwrap_or_else(|| format!("rank-{rank}"))
    }

    pub fn runner(&self) -> Arc<SubprocessRunner> {
        let mut runner = SubprocessRunner::new(self.model_command.clone(), self.model_args.clone())
            .with_timeout(self.model_timeout);
        if let Some(dir) = &self.model_workdir {
            runner = runner.with_working_dir(dir);
        }
        Arc::new(runner)
    }
}
