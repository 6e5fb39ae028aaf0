//! Deterministic natural-language command surface (spec §4.N): parse a
//! free-text command into an `Intent`, turn it into a `Plan` against the
//! resource graph, and execute that plan. No LLM calls anywhere in this
//! module, matching `original_source/.../nl/`'s regex-table approach.

pub mod executor;
pub mod intent;
pub mod planner;

pub use executor::{ExecutionResult, ExecutionStatus, PlanExecutor, StepResult};
pub use intent::{parse_intent, validate_intent, Intent};
pub use planner::build_plan;
