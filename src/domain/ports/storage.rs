//! Blob storage backend port (spec §4.E).

use async_trait::async_trait;

use crate::domain::ports::errors::OrchestratorError;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write `bytes` to `path`, creating any missing parent directories,
    /// and return the canonical URI of the written object.
    async fn write(&self, path: &str, bytes: Vec<u8>) -> Result<String, OrchestratorError>;

    async fn read(&self, path: &str) -> Result<Vec<u8>, OrchestratorError>;

    async fn list(&self, prefix: &str) -> Result<Vec<String>, OrchestratorError>;

    async fn exists(&self, path: &str) -> Result<bool, OrchestratorError>;

    async fn delete(&self, path: &str) -> Result<bool, OrchestratorError>;
}
