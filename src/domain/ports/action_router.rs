//! Action router port (spec §4.K): registry of `(resource_type, action)` ->
//! handler, consumed by connectors/adapters external to the core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::models::Resource;
use crate::domain::ports::errors::OrchestratorError;

/// Minimal RBAC role ordering used for the action-level minimum-role check.
/// Roles are total-ordered so `Admin` satisfies any lower requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Operator,
    Admin,
}

impl Default for Role {
    fn default() -> Self {
        Self::Admin
    }
}

/// A single registered action handler, dispatched by the router after RBAC
/// and resource-lookup checks pass. Handlers are external collaborators
/// (connectors); the router itself never performs network I/O.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(
        &self,
        resource: &Resource,
        payload: HashMap<String, Value>,
        user: &str,
        tenant: &str,
    ) -> Result<Value, OrchestratorError>;

    /// Minimum role required to invoke this action. Defaults to `Admin`
    /// per spec §4.K step 4.
    fn required_role(&self) -> Role {
        Role::Admin
    }
}

#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<(String, String), Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        resource_type: impl Into<String>,
        action_name: impl Into<String>,
        handler: Arc<dyn ActionHandler>,
    ) {
        self.handlers.insert((resource_type.into(), action_name.into()), handler);
    }

    pub fn get(&self, resource_type: &str, action_name: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers
            .get(&(resource_type.to_string(), action_name.to_string()))
            .cloned()
    }
}
