//! `fleetstack update` — replace a stack's file, groups or deployment type.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use fleetstack_core::{paths, DataStore, EdgeGroupId, StackId};
use fleetstack_sync::{
    ComposeConverter, LocalStorage, StackUpdater, UpdateReport, UpdateStackRequest, WriteResult,
};

use crate::{DeploymentTypeArg, Env};

/// Arguments for `fleetstack update`.
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Stack id.
    pub stack: u32,

    /// Compose file or Kubernetes manifest to deploy.
    #[arg(long, short = 'f')]
    pub file: PathBuf,

    /// Edge group id; repeat for several. Omit to keep the current groups.
    #[arg(long = "group", short = 'g', value_name = "ID")]
    pub groups: Vec<u32>,

    /// compose | kubernetes. Defaults to the stack's current type.
    #[arg(long = "type", short = 't', value_name = "TYPE")]
    pub deployment_type: Option<DeploymentTypeArg>,

    /// Bump the stack version so endpoints redeploy it.
    #[arg(long)]
    pub bump_version: bool,

    /// Let Kubernetes manifests choose their own namespaces.
    #[arg(long)]
    pub use_manifest_namespaces: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct UpdateJson {
    stack: u32,
    version: u32,
    deployment_type: String,
    entry_point: String,
    manifest_path: String,
    edge_groups: Vec<u32>,
    num_deployments: usize,
    added: Vec<u32>,
    removed: Vec<u32>,
    written: Vec<PathBuf>,
    unchanged: Vec<PathBuf>,
}

impl UpdateArgs {
    pub fn run(self, env: &Env) -> Result<()> {
        let store = &env.store;
        let stack_id = StackId(self.stack);
        let content = std::fs::read(&self.file)
            .with_context(|| format!("cannot read '{}'", self.file.display()))?;

        let deployment_type = match self.deployment_type {
            Some(arg) => arg.into(),
            None => {
                store
                    .stack(stack_id)
                    .with_context(|| format!("cannot load stack {stack_id}"))?
                    .deployment_type
            }
        };
        let edge_groups = if self.groups.is_empty() {
            None
        } else {
            Some(self.groups.iter().copied().map(EdgeGroupId).collect())
        };

        let storage = LocalStorage::new(paths::edge_stacks_root(store.home()));
        let converter = ComposeConverter;
        let report = StackUpdater::new(store, &storage, &converter)
            .with_settings(&env.settings)
            .run(UpdateStackRequest {
                stack_id,
                content,
                edge_groups,
                deployment_type,
                bump_version: self.bump_version,
                use_manifest_namespaces: self.use_manifest_namespaces,
            })
            .with_context(|| format!("update failed for stack {stack_id}"))?;

        if self.json {
            print_json(report)
        } else {
            print_report(&report);
            Ok(())
        }
    }
}

fn print_json(report: UpdateReport) -> Result<()> {
    let (written, unchanged): (Vec<_>, Vec<_>) = report
        .writes
        .iter()
        .partition(|w| matches!(w, WriteResult::Written { .. }));
    let stack = report.stack;
    let payload = UpdateJson {
        stack: stack.id.0,
        version: stack.version,
        deployment_type: stack.deployment_type.to_string(),
        entry_point: stack.entry_point,
        manifest_path: stack.manifest_path,
        edge_groups: stack.edge_groups.iter().map(|g| g.0).collect(),
        num_deployments: stack.num_deployments,
        added: report.relations.added.iter().map(|e| e.0).collect(),
        removed: report.relations.removed.iter().map(|e| e.0).collect(),
        written: written.iter().map(|w| w.path().to_path_buf()).collect(),
        unchanged: unchanged.iter().map(|w| w.path().to_path_buf()).collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize update JSON")?
    );
    Ok(())
}

fn print_report(report: &UpdateReport) {
    let stack = &report.stack;
    println!(
        "✓ stack {} '{}' updated (version {}, {}, {} endpoint(s))",
        stack.id, stack.name, stack.version, stack.deployment_type, stack.num_deployments
    );
    if report.transition.is_switch() {
        println!("  deployment type switched; previous files removed");
    }

    for endpoint in &report.relations.added {
        println!("  +  endpoint {endpoint}");
    }
    for endpoint in &report.relations.removed {
        println!("  -  endpoint {endpoint}");
    }
    for write in &report.writes {
        match write {
            WriteResult::Written { path } => println!("  ✎  {}", path.display()),
            WriteResult::Unchanged { path } => println!("  ·  {}", path.display()),
        }
    }
}
