//! In-memory reference connector used by tests and dry-run CLI flows. Real
//! connectors (Gmail/Outlook/Teams/Slack/Notion) live outside this core and
//! implement the same `Connector` trait.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{Connector, ConnectorResult};

#[derive(Default)]
pub struct InMemoryConnector {
    records: RwLock<HashMap<(String, String), Value>>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, resource_type: &str, id: &str, payload: Value) {
        self.records
            .write()
            .await
            .insert((resource_type.to_string(), id.to_string()), payload);
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn connect(&self) -> ConnectorResult {
        ConnectorResult::ok(json!({"connected": true}))
    }

    async fn disconnect(&self) -> ConnectorResult {
        ConnectorResult::ok(json!({"connected": false}))
    }

    async fn list_resources(&self, resource_type: &str, _filters: Option<HashMap<String, Value>>) -> ConnectorResult {
        let records = self.records.read().await;
        let matches: Vec<&Value> = records
            .iter()
            .filter(|((rt, _), _)| rt == resource_type)
            .map(|(_, v)| v)
            .collect();
        ConnectorResult::ok(json!(matches))
    }

    async fn get_resource(&self, resource_type: &str, id: &str) -> ConnectorResult {
        let records = self.records.read().await;
        match records.get(&(resource_type.to_string(), id.to_string())) {
            Some(v) => ConnectorResult::ok(v.clone()),
            None => ConnectorResult::error(format!("resource {resource_type}/{id} not found")),
        }
    }

    async fn create_resource(&self, resource_type: &str, payload: HashMap<String, Value>) -> ConnectorResult {
        let id = payload
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let value = json!(payload);
        self.records
            .write()
            .await
            .insert((resource_type.to_string(), id.clone()), value.clone());
        ConnectorResult::ok(value)
    }

    async fn update_resource(&self, resource_type: &str, id: &str, payload: HashMap<String, Value>) -> ConnectorResult {
        let key = (resource_type.to_string(), id.to_string());
        let mut records = self.records.write().await;
        if !records.contains_key(&key) {
            return ConnectorResult::error(format!("resource {resource_type}/{id} not found"));
        }
        let value = json!(payload);
        records.insert(key, value.clone());
        ConnectorResult::ok(value)
    }

    async fn delete_resource(&self, resource_type: &str, id: &str) -> ConnectorResult {
        let key = (resource_type.to_string(), id.to_string());
        match self.records.write().await.remove(&key) {
            Some(_) => ConnectorResult::ok(json!({"deleted": id})),
            None => ConnectorResult::error(format!("resource {resource_type}/{id} not found")),
        }
    }
}
