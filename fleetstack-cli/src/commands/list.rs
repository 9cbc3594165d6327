//! `fleetstack list` — every stack with its type, version and reach.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use fleetstack_core::DataStore;

use crate::Env;

/// Arguments for `fleetstack list`.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StackJson {
    id: u32,
    name: String,
    deployment_type: String,
    version: u32,
    edge_groups: Vec<u32>,
    num_deployments: usize,
    pending_sync: bool,
}

#[derive(Tabled)]
struct StackTableRow {
    #[tabled(rename = "id")]
    id: u32,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "type")]
    deployment_type: String,
    #[tabled(rename = "version")]
    version: u32,
    #[tabled(rename = "groups")]
    edge_groups: String,
    #[tabled(rename = "endpoints")]
    num_deployments: usize,
    #[tabled(rename = "sync")]
    sync: String,
}

impl ListArgs {
    pub fn run(self, env: &Env) -> Result<()> {
        let store = &env.store;
        let mut stacks = Vec::new();
        for stack in store.list_stacks().context("failed to list stacks")? {
            let pending = store
                .pending_sync(stack.id)
                .with_context(|| format!("failed to read journal for stack {}", stack.id))?
                .is_some();
            stacks.push(StackJson {
                id: stack.id.0,
                name: stack.name,
                deployment_type: stack.deployment_type.to_string(),
                version: stack.version,
                edge_groups: stack.edge_groups.iter().map(|g| g.0).collect(),
                num_deployments: stack.num_deployments,
                pending_sync: pending,
            });
        }

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&stacks).context("failed to serialize stack list")?
            );
            return Ok(());
        }

        if stacks.is_empty() {
            println!("No stacks found.");
            return Ok(());
        }
        let interrupted = stacks.iter().filter(|s| s.pending_sync).count();
        let rows: Vec<StackTableRow> = stacks
            .into_iter()
            .map(|s| StackTableRow {
                id: s.id,
                name: s.name,
                deployment_type: s.deployment_type,
                version: s.version,
                edge_groups: s
                    .edge_groups
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
                num_deployments: s.num_deployments,
                sync: if s.pending_sync {
                    "INTERRUPTED".yellow().bold().to_string()
                } else {
                    "ok".to_string()
                },
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");

        if interrupted > 0 {
            println!("Run 'fleetstack reconcile --all' to finish interrupted relation syncs.");
        }
        Ok(())
    }
}
