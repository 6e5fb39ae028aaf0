//! Workflow orchestration core: a DAG runner with pause/resume
//! checkpoints, a persistent job queue, a tenant-isolated resource graph,
//! an RBAC-gated action router, a deterministic NL planner/executor, and
//! an autoscaling worker pool.

pub mod cli;
pub mod connectors;
pub mod domain;
pub mod infrastructure;
pub mod services;
