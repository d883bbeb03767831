use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::s3::{S3ArtifactStore, S3Config};

/// Per-request overrides of the store's default bucket and key prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadTarget {
    pub bucket: Option<String>,
    pub key_prefix: Option<String>,
}

/// Destination for finished artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload `local` and return the URL it can be fetched from.
    async fn upload(&self, local: &Path, target: &UploadTarget) -> Result<String, StorageError>;
}

/// Keeps artifacts where the model wrote them.
///
/// Selected when no object storage is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalOnlyStore;

#[async_trait]
impl ArtifactStore for LocalOnlyStore {
    async fn upload(&self, local: &Path, _target: &UploadTarget) -> Result<String, StorageError> {
        if !tokio::fs::try_exists(local).await? {
            return Err(StorageError::NotFound(local.to_path_buf()));
        }
        Ok(local.display().to_string())
    }
}

/// Upload `local`, falling back to its local path on any failure.
pub async fn upload_or_local(store: &dyn ArtifactStore, local: &Path, target: &UploadTarget) -> String {
    match store.upload(local, target).await {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(
                path = %local.display(),
                error = %e,
                "Artifact upload failed, returning local path",
            );
            local.display().to_string()
        }
    }
}

/// Pick the artifact store from the environment.
///
/// Uses S3 when `S3_BUCKET` or `S3_ENDPOINT_URL` is set, otherwise keeps
/// artifacts local.
pub async fn store_from_env() -> Arc<dyn ArtifactStore> {
    match S3Config::from_env() {
        Some(config) => {
            tracing::info!(
                bucket = config.bucket.as_deref().unwrap_or("<per-request>"),
                endpoint = config.endpoint_url.as_deref().unwrap_or("<default>"),
                "Uploading artifacts to S3",
            );
            Arc::new(S3ArtifactStore::connect(config).await)
        }
        None => {
            tracing::info!("No object storage configured, artifacts stay local");
            Arc::new(LocalOnlyStore)
        }
    }
}
