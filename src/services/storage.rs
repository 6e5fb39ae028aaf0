//! Storage backend (spec §4.E): local filesystem, S3, or GCS behind one
//! trait, selected by URI scheme. Grounded on
//! `original_source/.../storage.py`'s `get_storage_backend` scheme dispatch,
//! reimplemented over `object_store` rather than hand-rolled SDK calls for
//! each backend.

use async_trait::async_trait;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;

use crate::domain::ports::errors::OrchestratorError;
use crate::domain::ports::storage::StorageBackend as StorageBackendPort;

/// Wraps an `object_store::ObjectStore` plus the scheme-appropriate prefix
/// used to render a human-readable URI back to the caller.
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    uri_prefix: String,
}

impl ObjectStoreBackend {
    /// Build a backend from a root location: `s3://bucket/prefix`,
    /// `gs://bucket/prefix`, or a local filesystem path. All write
    /// operations create missing directories (object_store does this for
    /// `LocalFileSystem` automatically; S3/GCS have no directory concept).
    pub fn from_uri(root: &str) -> Result<Self, OrchestratorError> {
        if let Some(bucket_and_prefix) = root.strip_prefix("s3://") {
            let (bucket, prefix) = split_bucket(bucket_and_prefix);
            let store = object_store::aws::AmazonS3Builder::from_env()
                .with_bucket_name(bucket)
                .build()
                .map_err(|e| OrchestratorError::fatal(format!("configuring S3 backend: {e}")))?;
            return Ok(Self {
                store: Arc::new(store),
                uri_prefix: format!("s3://{bucket}/{prefix}"),
            });
        }

        if let Some(bucket_and_prefix) = root.strip_prefix("gs://") {
            let (bucket, prefix) = split_bucket(bucket_and_prefix);
            let store = object_store::gcp::GoogleCloudStorageBuilder::from_env()
                .with_bucket_name(bucket)
                .build()
                .map_err(|e| OrchestratorError::fatal(format!("configuring GCS backend: {e}")))?;
            return Ok(Self {
                store: Arc::new(store),
                uri_prefix: format!("gs://{bucket}/{prefix}"),
            });
        }

        std::fs::create_dir_all(root).map_err(|e| OrchestratorError::fatal(format!("creating {root}: {e}")))?;
        let store = LocalFileSystem::new_with_prefix(root)
            .map_err(|e| OrchestratorError::fatal(format!("configuring local backend at {root}: {e}")))?;
        Ok(Self {
            store: Arc::new(store),
            uri_prefix: root.trim_end_matches('/').to_string(),
        })
    }

    fn object_path(&self, path: &str) -> ObjectPath {
        ObjectPath::from(path)
    }
}

fn split_bucket(bucket_and_prefix: &str) -> (&str, &str) {
    match bucket_and_prefix.split_once('/') {
        Some((bucket, prefix)) => (bucket, prefix),
        None => (bucket_and_prefix, ""),
    }
}

#[async_trait]
impl StorageBackendPort for ObjectStoreBackend {
    async fn write(&self, path: &str, bytes: Vec<u8>) -> Result<String, OrchestratorError> {
        let object_path = self.object_path(path);
        self.store
            .put(&object_path, PutPayload::from(bytes))
            .await
            .map_err(|e| OrchestratorError::fatal(format!("writing {path}: {e}")))?;
        Ok(format!("{}/{path}", self.uri_prefix))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, OrchestratorError> {
        let object_path = self.object_path(path);
        let result = self
            .store
            .get(&object_path)
            .await
            .map_err(|e| OrchestratorError::not_found(format!("reading {path}: {e}")))?;
        let bytes = result
            .bytes()
            .await
            .map_err(|e| OrchestratorError::fatal(format!("collecting bytes for {path}: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, OrchestratorError> {
        use futures::StreamExt;

        let object_prefix = if prefix.is_empty() {
            None
        } else {
            Some(self.object_path(prefix))
        };

        let mut stream = self.store.list(object_prefix.as_ref());
        let mut paths = Vec::new();
        while let Some(meta) = stream.next().await {
            let meta = meta.map_err(|e| OrchestratorError::fatal(format!("listing {prefix}: {e}")))?;
            paths.push(meta.location.to_string());
        }
        paths.sort();
        Ok(paths)
    }

    async fn exists(&self, path: &str) -> Result<bool, OrchestratorError> {
        match self.store.head(&self.object_path(path)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(OrchestratorError::fatal(format!("checking {path}: {e}"))),
        }
    }

    async fn delete(&self, path: &str) -> Result<bool, OrchestratorError> {
        match self.store.delete(&self.object_path(path)).await {
            Ok(()) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(OrchestratorError::fatal(format!("deleting {path}: {e}"))),
        }
    }
}

/// Parse `RUNS_DIR`-style configuration and construct the right backend,
/// mirroring `get_storage_backend()`'s scheme dispatch.
pub fn backend_for(runs_dir: &str) -> Result<ObjectStoreBackend, OrchestratorError> {
    ObjectStoreBackend::from_uri(runs_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn local_round_trip() {
        let dir = tempdir().unwrap();
        let backend = ObjectStoreBackend::from_uri(dir.path().to_str().unwrap()).unwrap();

        let uri = backend.write("a/b.json", b"hello".to_vec()).await.unwrap();
        assert!(uri.ends_with("a/b.json"));

        assert!(backend.exists("a/b.json").await.unwrap());
        assert_eq!(backend.read("a/b.json").await.unwrap(), b"hello");

        let listed = backend.list("a").await.unwrap();
        assert_eq!(listed, vec!["a/b.json".to_string()]);

        assert!(backend.delete("a/b.json").await.unwrap());
        assert!(!backend.exists("a/b.json").await.unwrap());
    }
}
