//! NL plan domain model, spec §4.N / §3 `Plan`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub action: String,
    pub graph_id: String,
    pub payload: HashMap<String, Value>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: String,
    pub intent: String,
    pub steps: Vec<PlanStep>,
    pub risk_level: RiskLevel,
    pub requires_approval: bool,
    pub preview: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Plan {
    /// Render a deterministic multi-line preview of every step, used both
    /// as the returned `preview` field and as the checkpoint prompt when
    /// the plan requires approval.
    pub fn render_preview(intent: &str, steps: &[PlanStep]) -> String {
        let mut lines = vec![format!("Plan for: {intent}")];
        for (i, step) in steps.iter().enumerate() {
            lines.push(format!(
                "  {}. {} -> {} ({})",
                i + 1,
                step.action,
                step.graph_id,
                step.description
            ));
        }
        lines.join("\n")
    }
}
