/// Failures raised while the model is running.
///
/// All of them are reported as a single FAILED record by rank 0; none are
/// retried.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Failed to launch model process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Model process exited with code {code}: {stderr_tail}")]
    ProcessFailed { code: i32, stderr_tail: String },

    #[error("Model process timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Model finished without producing a video")]
    MissingOutput,

    #[error("Output video not found at {0}")]
    OutputNotFound(String),

    /// Raised by the model itself.
    #[error("Model error: {0}")]
    Model(String),

    #[error("Failed to encode invocation: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
