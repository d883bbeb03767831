//! Artifact handoff: move a finished video to object storage.
//!
//! Uploading is best-effort. [`upload_or_local`] never fails; when the
//! store is unavailable or the upload errors, the local path is returned in
//! place of a remote URL.

pub mod error;
pub mod s3;
pub mod store;

pub use error::StorageError;
pub use s3::{S3ArtifactStore, S3Config};
pub use store::{store_from_env, upload_or_local, ArtifactStore, LocalOnlyStore, UploadTarget};
