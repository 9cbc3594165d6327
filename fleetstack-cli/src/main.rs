//! fleetstack — edge stack update and relation maintenance CLI.
//!
//! # Usage
//!
//! ```text
//! fleetstack update <stack> --file <path> [--group <id>]... [--type compose|kubernetes]
//!                   [--bump-version] [--use-manifest-namespaces] [--json]
//! fleetstack reconcile <stack>
//! fleetstack reconcile --all
//! fleetstack show <stack> [--json]
//! fleetstack list [--json]
//! ```
//!
//! Records live under `~/.fleetstack/`; artifacts under
//! `~/.fleetstack/edge_stacks/<stack>/`.

mod commands;

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{list::ListArgs, reconcile::ReconcileArgs, show::ShowArgs, update::UpdateArgs};
use fleetstack_core::{DeploymentType, FileStore, Settings};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "fleetstack",
    version,
    about = "Update edge stacks and keep endpoint relations in step",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replace a stack's file, groups or deployment type.
    Update(UpdateArgs),

    /// Recompute endpoint relations from a stack's groups and repair drift.
    Reconcile(ReconcileArgs),

    /// Show one stack and the endpoints it targets.
    Show(ShowArgs),

    /// List all stacks.
    List(ListArgs),
}

/// Store and settings shared by every command.
pub struct Env {
    pub store: FileStore,
    pub settings: Settings,
}

// ---------------------------------------------------------------------------
// Shared DeploymentType argument
// ---------------------------------------------------------------------------

/// Thin wrapper so clap can parse `DeploymentType` from CLI args.
#[derive(Debug, Clone, Copy)]
pub struct DeploymentTypeArg(pub DeploymentType);

impl FromStr for DeploymentTypeArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compose" => Ok(Self(DeploymentType::Compose)),
            "kubernetes" | "k8s" => Ok(Self(DeploymentType::Kubernetes)),
            other => Err(format!(
                "unknown deployment type '{other}'; expected: compose, kubernetes"
            )),
        }
    }
}

impl fmt::Display for DeploymentTypeArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<DeploymentTypeArg> for DeploymentType {
    fn from(d: DeploymentTypeArg) -> Self {
        d.0
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load().context("failed to load ~/.fleetstack/config.yaml")?;
    init_tracing(&settings.log_filter);

    let store = FileStore::open().context("failed to open ~/.fleetstack")?;
    let env = Env { store, settings };
    match cli.command {
        Commands::Update(args) => args.run(&env),
        Commands::Reconcile(args) => args.run(&env),
        Commands::Show(args) => args.run(&env),
        Commands::List(args) => args.run(&env),
    }
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
