use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Artifact not found: {0}")]
    NotFound(PathBuf),

    #[error("No bucket configured for upload")]
    NoBucket,

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
