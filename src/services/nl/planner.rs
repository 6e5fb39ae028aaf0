//! NL planner (spec §4.N): turns a parsed `Intent` into a `Plan` of
//! concrete action steps, each bound to a resource the URG already knows
//! about. Grounded on `original_source/.../nl/planner.py`'s `Plan`/
//! `ActionStep` shape (visible through `relay_ai.nl.planner` in
//! `test_nl_executor.py`, since the archived source tree itself only kept
//! `intents.py`/`executor.py`) and the risk table in spec §4.N.

use serde_json::Value;
use std::collections::HashMap;

use crate::domain::models::{Plan, PlanStep, RiskLevel};
use crate::services::nl::intent::Intent;
use crate::services::urg_index::UrgIndex;

/// `(resource_type, action_name)` this verb dispatches through the action
/// router (spec §4.K); `find`/`list` bypass the router entirely (handled as
/// a `search.execute` step the executor never sends to `execute_action`).
fn action_for(verb: &str) -> (&'static str, &'static str) {
    match verb {
        "email" => ("contact", "email"),
        "message" => ("message", "send"),
        "reply" => ("message", "reply"),
        "forward" => ("message", "forward"),
        "delete" => ("message", "delete"),
        "schedule" => ("calendar", "schedule"),
        "create" => ("resource", "create"),
        "update" => ("resource", "update"),
        _ => ("search", "execute"),
    }
}

/// Risk table from spec §4.N: low for read-only verbs, high for
/// destructive/broadcast/scheduling verbs or any verb fanned out across
/// more than one target (bulk), medium otherwise. `email`/`create`/
/// `update` aren't named in the spec's three buckets; they're grouped with
/// the single-recipient "medium" bucket here and promoted to `high` under
/// the same bulk rule (see DESIGN.md Open Question).
fn risk_for(verb: &str, step_count: usize) -> RiskLevel {
    match verb {
        "find" | "list" => RiskLevel::Low,
        "forward" | "delete" | "schedule" => RiskLevel::High,
        _ if step_count > 1 => RiskLevel::High,
        _ => RiskLevel::Medium,
    }
}

/// Build a `Plan` for `intent`. Targets are resolved against `urg` by
/// full-text search scoped to `tenant`, keeping the first hit per target;
/// a target with no resolvable resource is dropped from the plan rather
/// than failing it outright, since an NL command naming an unknown person
/// should still execute against the targets it *can* resolve.
pub fn build_plan(urg: &UrgIndex, tenant: &str, intent: &Intent, plan_id: impl Into<String>) -> Plan {
    let (resource_type, action_name) = action_for(&intent.verb);
    let action = format!("{resource_type}.{action_name}");

    let steps = if matches!(intent.verb.as_str(), "find" | "list") {
        vec![PlanStep {
            action,
            graph_id: "search".to_string(),
            payload: search_payload(intent),
            description: format!("Search for resources matching: {}", intent.original_command),
        }]
    } else {
        intent
            .targets
            .iter()
            .filter_map(|target| {
                urg.search(tenant, target, 1).into_iter().next().map(|resource| {
                    let graph_id = crate::domain::models::graph_id(&resource.source, &resource.resource_type, &resource.id);
                    PlanStep {
                        action: action.clone(),
                        graph_id,
                        payload: step_payload(intent),
                        description: format!("{} {} ({})", verb_label(&intent.verb), target, resource.title),
                    }
                })
            })
            .collect()
    };

    let risk_level = risk_for(&intent.verb, steps.len());
    let requires_approval = risk_level == RiskLevel::High;
    let preview = Plan::render_preview(&intent.original_command, &steps);

    Plan {
        plan_id: plan_id.into(),
        intent: intent.original_command.clone(),
        steps,
        risk_level,
        requires_approval,
        preview,
        metadata: HashMap::new(),
    }
}

fn verb_label(verb: &str) -> &'static str {
    match verb {
        "email" => "Email",
        "message" => "Message",
        "reply" => "Reply to",
        "forward" => "Forward to",
        "delete" => "Delete for",
        "schedule" => "Schedule with",
        "create" => "Create for",
        "update" => "Update for",
        _ => "Act on",
    }
}

fn step_payload(intent: &Intent) -> HashMap<String, Value> {
    let mut payload = HashMap::new();
    if let Some(artifact) = intent.artifacts.first() {
        payload.insert("artifact".to_string(), Value::String(artifact.clone()));
    }
    for (key, value) in &intent.constraints {
        payload.insert(key.clone(), Value::String(value.clone()));
    }
    payload
}

fn search_payload(intent: &Intent) -> HashMap<String, Value> {
    let mut payload = HashMap::new();
    payload.insert(
        "targets".to_string(),
        Value::Array(intent.targets.iter().cloned().map(Value::String).collect()),
    );
    for (key, value) in &intent.constraints {
        payload.insert(key.clone(), Value::String(value.clone()));
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Resource;
    use crate::services::nl::intent::parse_intent;
    use chrono::Utc;
    use tempfile::tempdir;

    async fn urg_with(resources: Vec<Resource>) -> UrgIndex {
        let dir = tempdir().unwrap();
        let urg = UrgIndex::new(dir.path().to_path_buf());
        for resource in resources {
            urg.upsert(resource).await.unwrap();
        }
        urg
    }

    fn contact(id: &str, tenant: &str, title: &str) -> Resource {
        Resource {
            id: id.to_string(),
            resource_type: "contact".to_string(),
            source: "directory".to_string(),
            tenant: tenant.to_string(),
            title: title.to_string(),
            snippet: String::new(),
            timestamp: Utc::now(),
            participants: Vec::new(),
            labels: Vec::new(),
            thread_id: None,
            channel_id: None,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn find_intent_yields_low_risk_search_step() {
        let urg = urg_with(vec![]).await;
        let intent = parse_intent("Find messages from Alice");
        let plan = build_plan(&urg, "tenant-a", &intent, "nlp-1");

        assert_eq!(plan.risk_level, RiskLevel::Low);
        assert!(!plan.requires_approval);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].action, "search.execute");
    }

    #[tokio::test]
    async fn single_message_target_is_medium_risk() {
        let urg = urg_with(vec![contact("c1", "tenant-a", "Alice")]).await;
        let intent = parse_intent("Message Alice about the meeting");
        let plan = build_plan(&urg, "tenant-a", &intent, "nlp-2");

        assert_eq!(plan.risk_level, RiskLevel::Medium);
        assert!(!plan.requires_approval);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].action, "message.send");
    }

    #[tokio::test]
    async fn delete_is_always_high_risk_and_requires_approval() {
        let urg = urg_with(vec![contact("c1", "tenant-a", "Alice")]).await;
        let intent = parse_intent("Delete messages from Alice");
        let plan = build_plan(&urg, "tenant-a", &intent, "nlp-3");

        assert_eq!(plan.risk_level, RiskLevel::High);
        assert!(plan.requires_approval);
    }

    #[tokio::test]
    async fn fan_out_across_multiple_targets_escalates_to_high_risk() {
        let urg = urg_with(vec![contact("c1", "tenant-a", "Alice"), contact("c2", "tenant-a", "Bob")]).await;
        let intent = parse_intent("Message Alice and Bob about the deploy");
        let plan = build_plan(&urg, "tenant-a", &intent, "nlp-4");

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.risk_level, RiskLevel::High);
        assert!(plan.requires_approval);
    }

    #[tokio::test]
    async fn unresolvable_target_is_dropped_not_failed() {
        let urg = urg_with(vec![]).await;
        let intent = parse_intent("Message Nobody about the meeting");
        let plan = build_plan(&urg, "tenant-a", &intent, "nlp-5");

        assert!(plan.steps.is_empty());
    }
}
