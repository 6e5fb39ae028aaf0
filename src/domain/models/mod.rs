//! Domain models: plain data, no I/O.

pub mod audit;
pub mod checkpoint;
pub mod dag;
pub mod dag_run;
pub mod job;
pub mod plan;
pub mod resource;
pub mod task;

pub use audit::{AuditEvent, AuditResult};
pub use checkpoint::{Approval, Checkpoint, CheckpointStatus, ResumeToken};
pub use dag::{Dag, DagError};
pub use dag_run::{DagRun, DagRunStatus};
pub use job::{DagSource, DeadLetter, Job, JobOutcome, JobStatus, TaskClass};
pub use plan::{Plan, PlanStep, RiskLevel};
pub use resource::{graph_id, Resource};
pub use task::{Task, TaskKind};
