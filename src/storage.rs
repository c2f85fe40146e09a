// src/storage.rs

use crate::config::{StorageBackend, StorageSection};
use crate::error::DependencyError;
use async_trait::async_trait;
use reqwest::Client;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Blob storage for the raw uploads.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str)
    -> Result<(), DependencyError>;
}

/// Build the configured store.
pub fn from_config(cfg: &StorageSection) -> Box<dyn ObjectStore> {
    info!(
        backend = ?cfg.backend,
        bucket = %cfg.bucket,
        region = %cfg.region,
        "Object store configured"
    );
    match cfg.backend {
        StorageBackend::Fs => Box::new(FsObjectStore::new(Path::new(&cfg.root).join(&cfg.bucket))),
        StorageBackend::Http => Box::new(HttpObjectStore::new(&cfg.endpoint, &cfg.bucket)),
    }
}

/// Upload key: `{prefix}/{unix_ts}_{filename}`.
pub fn object_key(prefix: &str, unix_ts: i64, filename: &str) -> String {
    format!("{prefix}/{unix_ts}_{filename}")
}

// ---------------------------------------------------------------------------
// Local filesystem
// ---------------------------------------------------------------------------

pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a key under the root, refusing anything that would escape it.
    fn resolve(&self, key: &str) -> Result<PathBuf, DependencyError> {
        let rel = Path::new(key);
        let clean = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !clean {
            return Err(DependencyError::malformed(
                "object store",
                format!("refusing key {key:?}"),
            ));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), DependencyError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        info!(path = %path.display(), bytes = bytes.len(), content_type, "Object stored");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// S3-compatible HTTP
// ---------------------------------------------------------------------------

pub struct HttpObjectStore {
    client: Client,
    endpoint: String,
    bucket: String,
}

impl HttpObjectStore {
    pub fn new(endpoint: &str, bucket: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
        }
    }

    fn url(&self, key: &str) -> String {
        let encoded: Vec<_> = key.split('/').map(urlencoding::encode).collect();
        format!("{}/{}/{}", self.endpoint, self.bucket, encoded.join("/"))
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), DependencyError> {
        let url = self.url(key);
        let response = self
            .client
            .put(&url)
            .header("Content-Type", content_type)
            .timeout(Duration::from_secs(30))
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(DependencyError::transport("object store"))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DependencyError::Status {
                service: "object store",
                status,
                body,
            });
        }
        info!(url = %url, bytes = bytes.len(), "Object uploaded");
        Ok(())
    }
}
