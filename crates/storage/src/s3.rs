//! S3-compatible artifact store.
//!
//! # Environment variables
//!
//! | Variable          | Default   | Description                                   |
//! |-------------------|-----------|-----------------------------------------------|
//! | `S3_ENDPOINT_URL` | unset     | Custom endpoint (MinIO, R2, ...); path-style  |
//! | `S3_BUCKET`       | unset     | Default bucket; requests may override it      |
//! | `S3_KEY_PREFIX`   | `videos`  | Key prefix for uploaded artifacts             |
//!
//! Credentials and region come from the standard AWS provider chain.

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;

use crate::error::StorageError;
use crate::store::{ArtifactStore, UploadTarget};

pub const DEFAULT_KEY_PREFIX: &str = "videos";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    pub endpoint_url: Option<String>,
    pub bucket: Option<String>,
    pub key_prefix: String,
}

impl S3Config {
    /// Read the configuration; `None` when neither a bucket nor an endpoint
    /// is configured.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let endpoint_url = non_empty("S3_ENDPOINT_URL");
        let bucket = non_empty("S3_BUCKET");
        if endpoint_url.is_none() && bucket.is_none() {
            return None;
        }
        Some(Self {
            endpoint_url,
            bucket,
            key_prefix: non_empty("S3_KEY_PREFIX").unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
        })
    }
}

/// Object key for `file_name` under `prefix`.
pub fn object_key(prefix: &str, file_name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        file_name.to_string()
    } else {
        format!("{prefix}/{file_name}")
    }
}

pub struct S3ArtifactStore {
    client: aws_sdk_s3::Client,
    config: S3Config,
}

impl S3ArtifactStore {
    /// Build a client from the AWS provider chain plus `config`'s endpoint.
    ///
    /// No request is made here; connection problems surface on upload.
    pub async fn connect(config: S3Config) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.endpoint_url.is_some())
            .build();
        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            config,
        }
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn upload(&self, local: &Path, target: &UploadTarget) -> Result<String, StorageError> {
        let bucket = target
            .bucket
            .as_deref()
            .or(self.config.bucket.as_deref())
            .ok_or(StorageError::NoBucket)?;
        let prefix = target
            .key_prefix
            .as_deref()
            .unwrap_or(&self.config.key_prefix);
        let file_name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| StorageError::NotFound(local.to_path_buf()))?;
        let key = object_key(prefix, &file_name);

        let body = ByteStream::from_path(local)
            .await
            .map_err(|e| StorageError::Upload(format!("reading {}: {e}", local.display())))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(&key)
            .content_type("video/mp4")
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Upload(DisplayErrorContext(&e).to_string()))?;

        let url = format!("s3://{bucket}/{key}");
        tracing::info!(url = %url, "Artifact uploaded");
        Ok(url)
    }
}
