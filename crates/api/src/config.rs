use std::str::FromStr;

/// Where generation requests are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    /// Broadcast to workers connected on `/api/v1/workers/ws`.
    Remote,
    /// Run `LOCAL_WORLD_SIZE` ranks inside the gateway process.
    Local,
}

impl FromStr for WorkerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" => Ok(Self::Remote),
            "local" => Ok(Self::Local),
            other => Err(format!("unknown worker mode '{other}' (expected 'remote' or 'local')")),
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Upper bound on post-shutdown cleanup in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    pub worker_mode: WorkerMode,
    /// Ranks in the in-process group when `worker_mode` is `Local`.
    pub local_world_size: u32,
    /// Progress records kept for polling (default: `65536`).
    pub progress_retention: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                 |
    /// |-------------------------|-------------------------|
    /// | `HOST`                  | `0.0.0.0`               |
    /// | `PORT`                  | `3000`                  |
    /// | `CORS_ORIGINS`          | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                    |
    /// | `WORKER_MODE`           | `remote`                |
    /// | `LOCAL_WORLD_SIZE`      | `1`                     |
    /// | `PROGRESS_RETENTION`    | `65536`                 |
    ///
    /// Panics on malformed values; misconfiguration should fail at startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let worker_mode: WorkerMode = std::env::var("WORKER_MODE")
            .unwrap_or_else(|_| "remote".into())
            .parse()
            .unwrap_or_else(|e| panic!("WORKER_MODE: {e}"));

        let local_world_size: u32 = std::env::var("LOCAL_WORLD_SIZE")
            .unwrap_or_else(|_| "1".into())
            .parse()
            .expect("LOCAL_WORLD_SIZE must be a valid u32");
        assert!(local_world_size >= 1, "LOCAL_WORLD_SIZE must be at least 1");

        let progress_retention: usize = std::env::var("PROGRESS_RETENTION")
            .unwrap_or_else(|_| "65536".into())
            .parse()
            .expect("PROGRESS_RETENTION must be a valid usize");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            worker_mode,
            local_world_size,
            progress_retention,
        }
    }
}
