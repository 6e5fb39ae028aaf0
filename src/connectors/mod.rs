//! Connector interface (spec §4.P): the shared contract the core consumes
//! from external collaborators (Gmail/Outlook/Teams/Slack/Notion-shaped
//! adapters). The wire protocols themselves are out of scope; this module
//! only defines the contract and one in-memory reference adapter used by
//! tests and dry-run CLI flows.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Outcome of a connector operation. A plain sum type per the REDESIGN
/// FLAGS ("duck-typed" connector returns get an explicit `status` variant
/// instead of narrowed-at-the-call-site dict shapes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorResult {
    pub status: ConnectorStatus,
    pub data: Option<Value>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorStatus {
    Success,
    Error,
    Denied,
}

impl ConnectorResult {
    pub fn ok(data: Value) -> Self {
        Self {
            status: ConnectorStatus::Success,
            data: Some(data),
            message: String::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ConnectorStatus::Error,
            data: None,
            message: message.into(),
        }
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self {
            status: ConnectorStatus::Denied,
            data: None,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> ConnectorResult;
    async fn disconnect(&self) -> ConnectorResult;
    async fn list_resources(&self, resource_type: &str, filters: Option<HashMap<String, Value>>) -> ConnectorResult;
    async fn get_resource(&self, resource_type: &str, id: &str) -> ConnectorResult;
    async fn create_resource(&self, resource_type: &str, payload: HashMap<String, Value>) -> ConnectorResult;
    async fn update_resource(&self, resource_type: &str, id: &str, payload: HashMap<String, Value>) -> ConnectorResult;
    async fn delete_resource(&self, resource_type: &str, id: &str) -> ConnectorResult;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorInfo {
    pub name: String,
    pub enabled: bool,
}

/// Tracks registered connectors and which are enabled, backing the CLI's
/// `connectors list|register|enable|disable|test` surface (spec §6). A
/// connector must be registered before it can be enabled/disabled/tested.
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: RwLock<HashMap<String, Arc<dyn Connector>>>,
    enabled: RwLock<HashSet<String>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, name: impl Into<String>, connector: Arc<dyn Connector>) {
        self.connectors.write().await.insert(name.into(), connector);
    }

    pub async fn list(&self) -> Vec<ConnectorInfo> {
        let connectors = self.connectors.read().await;
        let enabled = self.enabled.read().await;
        let mut infos: Vec<ConnectorInfo> = connectors
            .keys()
            .map(|name| ConnectorInfo {
                name: name.clone(),
                enabled: enabled.contains(name),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub async fn enable(&self, name: &str) -> Result<(), String> {
        if !self.connectors.read().await.contains_key(name) {
            return Err(format!("connector '{name}' is not registered"));
        }
        self.enabled.write().await.insert(name.to_string());
        Ok(())
    }

    pub async fn disable(&self, name: &str) -> Result<(), String> {
        if !self.connectors.read().await.contains_key(name) {
            return Err(format!("connector '{name}' is not registered"));
        }
        self.enabled.write().await.remove(name);
        Ok(())
    }

    /// Connect then immediately disconnect, surfacing whatever
    /// `ConnectorResult` the connect attempt returned.
    pub async fn test(&self, name: &str) -> Result<ConnectorResult, String> {
        let connector = self.connectors.read().await.get(name).cloned().ok_or_else(|| format!("connector '{name}' is not registered"))?;
        let result = connector.connect().await;
        let _ = connector.disconnect().await;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::memory::InMemoryConnector;

    #[tokio::test]
    async fn enable_requires_prior_registration() {
        let registry = ConnectorRegistry::new();
        assert!(registry.enable("gmail").await.is_err());
    }

    #[tokio::test]
    async fn registered_connector_can_be_enabled_listed_and_tested() {
        let registry = ConnectorRegistry::new();
        registry.register("gmail", Arc::new(InMemoryConnector::new())).await;

        registry.enable("gmail").await.unwrap();
        let list = registry.list().await;
        assert_eq!(list.len(), 1);
        assert!(list[0].enabled);

        let result = registry.test("gmail").await.unwrap();
        assert_eq!(result.status, ConnectorStatus::Success);

        registry.disable("gmail").await.unwrap();
        assert!(!registry.list().await[0].enabled);
    }
}
