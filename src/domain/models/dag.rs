//! DAG domain model: validation, deterministic topological sort, and
//! upstream-output merge.
//!
//! Generalizes the teacher's task-dependency graph (`DagNode`/`TaskDag`,
//! originally built over persisted `Task` rows) to the spec's `Dag`/`Task`
//! pair, where a DAG is a named, tenant-scoped bundle of tasks rather than a
//! view derived from the whole task table.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use thiserror::Error;

use super::task::Task;

/// A directed acyclic graph of tasks belonging to one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dag {
    pub name: String,
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
    pub tasks: Vec<Task>,
}

fn default_tenant() -> String {
    "local-dev".to_string()
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DagError {
    #[error("DAG has no tasks")]
    Empty,
    #[error("duplicate task id: {0}")]
    DuplicateId(String),
    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: String, dependency: String },
    #[error("DAG contains a cycle")]
    CycleDetected,
    #[error("checkpoint task {0} must not set workflow_ref")]
    CheckpointHasWorkflowRef(String),
}

impl Dag {
    /// Enforce the structural invariants from spec §4.H: unique ids, at
    /// least one task, all `depends_on` resolve, no cycles, and checkpoint
    /// tasks never carry a `workflow_ref`.
    pub fn validate(&self) -> Result<(), DagError> {
        if self.tasks.is_empty() {
            return Err(DagError::Empty);
        }

        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(DagError::DuplicateId(task.id.clone()));
            }
        }

        let ids: HashSet<&str> = self.tasks.iter().map(|t| t.id.as_str()).collect();
        for task in &self.tasks {
            for dep in &task.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(DagError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            if task.is_checkpoint() && task.workflow_ref.is_some() {
                return Err(DagError::CheckpointHasWorkflowRef(task.id.clone()));
            }
        }

        self.toposort().map(|_| ())
    }

    /// Kahn's algorithm with ties broken by task id ascending, so the
    /// resulting order is deterministic across runs.
    pub fn toposort(&self) -> Result<Vec<&Task>, DagError> {
        let by_id: HashMap<&str, &Task> =
            self.tasks.iter().map(|t| (t.id.as_str(), t)).collect();

        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for task in &self.tasks {
            in_degree.entry(task.id.as_str()).or_insert(0);
            for dep in &task.depends_on {
                *in_degree.entry(task.id.as_str()).or_insert(0) += 1;
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(task.id.as_str());
            }
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut order = Vec::with_capacity(self.tasks.len());
        while let Some(&next_id) = ready.iter().next() {
            ready.remove(next_id);
            order.push(by_id[next_id]);

            if let Some(deps) = dependents.get(next_id) {
                for &dep_id in deps {
                    let deg = in_degree.get_mut(dep_id).expect("tracked above");
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert(dep_id);
                    }
                }
            }
        }

        if order.len() != self.tasks.len() {
            return Err(DagError::CycleDetected);
        }

        Ok(order)
    }
}

/// Shallow-merge upstream task outputs in task-id order, later keys
/// overwriting earlier ones. Values placed under an explicit `__ns` key
/// inside each upstream map are renamespaced with the producer's task id so
/// colliding keys from independent upstream tasks stay disambiguated.
pub fn merge_payloads(upstream_outputs: &HashMap<String, HashMap<String, Value>>) -> HashMap<String, Value> {
    let mut producer_ids: Vec<&String> = upstream_outputs.keys().collect();
    producer_ids.sort();

    let mut merged = HashMap::new();
    for producer_id in producer_ids {
        let output = &upstream_outputs[producer_id];
        for (key, value) in output {
            if key == "__ns" {
                let namespaced = format!("{producer_id}.__ns");
                merged.insert(namespaced, value.clone());
            } else {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

/// Build the `{dep_id -> output}` view a task needs from the run's full
/// `task_outputs` map, used before merging into checkpoint metadata or
/// workflow params.
pub fn upstream_outputs_for<'a>(
    task: &Task,
    task_outputs: &'a HashMap<String, HashMap<String, Value>>,
) -> HashMap<String, HashMap<String, Value>> {
    task.depends_on
        .iter()
        .map(|dep| (dep.clone(), task_outputs.get(dep).cloned().unwrap_or_default()))
        .collect()
}

/// Find the task id immediately after `task_id` in a deterministic order,
/// or `None` if it is the last task.
pub fn next_task_id(ordered: &[&Task], task_id: &str) -> Option<String> {
    let idx = ordered.iter().position(|t| t.id == task_id)?;
    ordered.get(idx + 1).map(|t| t.id.clone())
}
