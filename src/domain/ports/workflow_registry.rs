//! Workflow handler registry port, consumed by the DAG runner (spec §4.I).
//!
//! The original system imports a module-level `WORKFLOW_MAP` dict; the
//! REDESIGN FLAGS call for replacing that dynamic-decorator registry with
//! explicit, order-independent registration into a plain map, injected into
//! the runner rather than looked up through a global.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::ports::errors::OrchestratorError;

/// A single workflow task body. Agent/LLM invocations are opaque here per
/// spec §1 Non-goals — a handler is just an async function from merged
/// params to an output map.
#[async_trait]
pub trait WorkflowHandler: Send + Sync {
    async fn call(&self, params: HashMap<String, Value>) -> Result<HashMap<String, Value>, OrchestratorError>;
}

#[async_trait]
impl<F, Fut> WorkflowHandler for F
where
    F: Fn(HashMap<String, Value>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<HashMap<String, Value>, OrchestratorError>> + Send,
{
    async fn call(&self, params: HashMap<String, Value>) -> Result<HashMap<String, Value>, OrchestratorError> {
        (self)(params).await
    }
}

/// Plain, order-independent registry: `workflow_ref -> handler`.
#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    handlers: HashMap<String, Arc<dyn WorkflowHandler>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, workflow_ref: impl Into<String>, handler: Arc<dyn WorkflowHandler>) {
        self.handlers.insert(workflow_ref.into(), handler);
    }

    pub fn get(&self, workflow_ref: &str) -> Option<Arc<dyn WorkflowHandler>> {
        self.handlers.get(workflow_ref).cloned()
    }
}
