//! CLI interface module: command definitions and output formatting.
//! Grounded on the teacher's `cli` split into `commands`/`output`,
//! trimmed to the two surfaces spec §6 names (`connectors`, the worker
//! entry point) since the teacher's TUI/table/tree output components
//! have no counterpart here.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use commands::connectors::ConnectorsArgs;
use commands::worker::WorkerArgs;

#[derive(Parser, Debug)]
#[command(name = "orchestrator", about = "Workflow orchestration core: DAG runner, checkpoints, queue, and resource graph")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage registered connectors.
    Connectors(ConnectorsArgs),
    /// Run a single worker loop.
    Worker(WorkerArgs),
}
