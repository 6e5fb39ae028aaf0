//! Resource domain model for the Unified Resource Graph (URG), spec §4.J.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// The connector-local id, e.g. a Gmail message id.
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub source: String,
    pub tenant: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// Compute the stable graph URN: `urn:<source>:<type>:<id>`.
pub fn graph_id(source: &str, resource_type: &str, id: &str) -> String {
    format!("urn:{source}:{resource_type}:{id}")
}
