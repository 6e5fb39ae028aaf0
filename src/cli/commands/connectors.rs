//! `connectors list|register|enable|disable|test` (spec §6 CLI surface).
//! Grounded on the teacher's `cli::commands::adapter` subcommand shape
//! (clap `Args`/`Subcommand`, a `CommandOutput` result struct per
//! subcommand), adapted from adapter-plugin management to connector
//! registry management.

use clap::{Args, Subcommand};
use std::sync::Arc;

use crate::cli::output::{output, CommandOutput};
use crate::connectors::memory::InMemoryConnector;
use crate::connectors::{ConnectorInfo, ConnectorRegistry};
use crate::domain::ports::errors::OrchestratorError;

#[derive(Args, Debug)]
pub struct ConnectorsArgs {
    #[command(subcommand)]
    pub command: ConnectorsCommands,

    /// Acting user, recorded on audited operations.
    #[arg(long, global = true, default_value = "cli")]
    pub user: String,

    /// Tenant scope for the operation.
    #[arg(long, global = true, default_value = "default")]
    pub tenant: String,

    /// Emit machine-readable JSON instead of a human-readable table.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConnectorsCommands {
    /// List every registered connector and whether it's enabled.
    List,
    /// Register a connector under `name`. Real wire connectors are
    /// out of scope for this core (spec §4.P); this registers the
    /// in-memory reference adapter, the only concrete `Connector`
    /// implementation shipped here, for dry-run and test flows.
    Register { name: String },
    /// Enable a registered connector.
    Enable { name: String },
    /// Disable a registered connector.
    Disable { name: String },
    /// Connect then disconnect, reporting whether the round trip succeeded.
    Test { name: String },
}

#[derive(Debug, serde::Serialize)]
struct ConnectorListOutput {
    connectors: Vec<ConnectorInfo>,
}

impl CommandOutput for ConnectorListOutput {
    fn to_human(&self) -> String {
        if self.connectors.is_empty() {
            return "No connectors registered.".to_string();
        }
        let mut lines = vec!["NAME                 ENABLED".to_string()];
        for c in &self.connectors {
            lines.push(format!("{:<20} {}", c.name, c.enabled));
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
struct ConnectorActionOutput {
    name: String,
    action: String,
    ok: bool,
    detail: String,
}

impl CommandOutput for ConnectorActionOutput {
    fn to_human(&self) -> String {
        format!("{} {}: {} ({})", self.action, self.name, if self.ok { "ok" } else { "failed" }, self.detail)
    }
}

/// Dispatch a `connectors` subcommand, returning the process exit code
/// (0 success, 1 error) per spec §6.
pub async fn run(args: ConnectorsArgs, registry: Arc<ConnectorRegistry>) -> i32 {
    match args.command {
        ConnectorsCommands::List => {
            let connectors = registry.list().await;
            output(&ConnectorListOutput { connectors }, args.json);
            0
        }
        ConnectorsCommands::Register { name } => {
            registry.register(name.clone(), Arc::new(InMemoryConnector::new())).await;
            output(&ConnectorActionOutput { name, action: "register".into(), ok: true, detail: "registered".into() }, args.json);
            0
        }
        ConnectorsCommands::Enable { name } => match registry.enable(&name).await {
            Ok(()) => {
                output(&ConnectorActionOutput { name, action: "enable".into(), ok: true, detail: "enabled".into() }, args.json);
                0
            }
            Err(e) => {
                output(&ConnectorActionOutput { name, action: "enable".into(), ok: false, detail: e }, args.json);
                1
            }
        },
        ConnectorsCommands::Disable { name } => match registry.disable(&name).await {
            Ok(()) => {
                output(&ConnectorActionOutput { name, action: "disable".into(), ok: true, detail: "disabled".into() }, args.json);
                0
            }
            Err(e) => {
                output(&ConnectorActionOutput { name, action: "disable".into(), ok: false, detail: e }, args.json);
                1
            }
        },
        ConnectorsCommands::Test { name } => match registry.test(&name).await {
            Ok(result) => {
                let ok = result.status == crate::connectors::ConnectorStatus::Success;
                output(&ConnectorActionOutput { name, action: "test".into(), ok, detail: result.message }, args.json);
                i32::from(!ok)
            }
            Err(e) => {
                output(&ConnectorActionOutput { name, action: "test".into(), ok: false, detail: e }, args.json);
                1
            }
        },
    }
}

/// Exit code helper for commands that bubble up an `OrchestratorError`
/// instead of a registry-level `String` error (RBAC denials map to `2`).
pub fn exit_code_for(err: &OrchestratorError) -> i32 {
    err.exit_code()
}
