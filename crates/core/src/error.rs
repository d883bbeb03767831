/// Domain errors raised while validating and resolving generation requests.
///
/// All variants are configuration-class failures: they are detected before
/// any distributed coordination or model load takes place.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The task category is not one the dispatcher knows how to run.
    #[error("Task '{0}' is not implemented")]
    NotImplemented(String),

    /// The task category is known but no model configuration exists for it.
    #[error("Unsupported task: {0}")]
    UnsupportedTask(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    /// The worker group cannot accept work right now.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
