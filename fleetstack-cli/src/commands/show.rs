//! `fleetstack show` — one stack, its targets and their relation state.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use fleetstack_core::{DataStore, EndpointId, FileStore, PendingSync, Stack, StackId};
use fleetstack_sync::membership;

use crate::Env;

/// Arguments for `fleetstack show`.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Stack id.
    pub stack: u32,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

/// How an endpoint's relation record compares with the stack's groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelationState {
    /// In the groups and flagged.
    Ok,
    /// In the groups but not flagged.
    Missing,
    /// Flagged but no longer in the groups.
    Stray,
}

impl RelationState {
    fn key(self) -> &'static str {
        match self {
            RelationState::Ok => "ok",
            RelationState::Missing => "missing",
            RelationState::Stray => "stray",
        }
    }

    fn label(self) -> String {
        match self {
            RelationState::Ok => "OK".green().to_string(),
            RelationState::Missing => "MISSING".yellow().bold().to_string(),
            RelationState::Stray => "STRAY".red().bold().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct EndpointRow {
    id: EndpointId,
    name: String,
    platform: String,
    status: String,
    relation: RelationState,
}

#[derive(Serialize)]
struct ShowJson<'a> {
    stack: &'a Stack,
    pending_sync: Option<&'a PendingSync>,
    endpoints: Vec<EndpointJson>,
}

#[derive(Serialize)]
struct EndpointJson {
    id: u32,
    name: String,
    platform: String,
    status: String,
    relation: &'static str,
}

#[derive(Tabled)]
struct EndpointTableRow {
    #[tabled(rename = "endpoint")]
    id: u32,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "platform")]
    platform: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "relation")]
    relation: String,
}

impl ShowArgs {
    pub fn run(self, env: &Env) -> Result<()> {
        let store = &env.store;
        let stack_id = StackId(self.stack);
        let stack = store
            .stack(stack_id)
            .with_context(|| format!("cannot load stack {stack_id}"))?;
        let pending = store
            .pending_sync(stack_id)
            .with_context(|| format!("failed to read journal for stack {stack_id}"))?;
        let rows = build_rows(store, &stack)?;

        if self.json {
            let payload = ShowJson {
                stack: &stack,
                pending_sync: pending.as_ref(),
                endpoints: rows
                    .into_iter()
                    .map(|row| EndpointJson {
                        id: row.id.0,
                        name: row.name,
                        platform: row.platform,
                        status: row.status,
                        relation: row.relation.key(),
                    })
                    .collect(),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize stack JSON")?
            );
            return Ok(());
        }

        print_stack(&stack, pending.as_ref(), rows);
        Ok(())
    }
}

fn build_rows(store: &FileStore, stack: &Stack) -> Result<Vec<EndpointRow>> {
    let config = store.relation_config().context("failed to load fleet snapshot")?;
    let desired = membership::resolve(&stack.edge_groups, &config)
        .with_context(|| format!("cannot resolve groups of stack {}", stack.id))?;
    let actual: BTreeSet<EndpointId> = store
        .endpoint_relations()
        .context("failed to load endpoint relations")?
        .into_iter()
        .filter(|r| r.targets(stack.id))
        .map(|r| r.endpoint_id)
        .collect();

    let mut rows = Vec::new();
    for id in desired.union(&actual) {
        let relation = match (desired.contains(id), actual.contains(id)) {
            (true, true) => RelationState::Ok,
            (true, false) => RelationState::Missing,
            _ => RelationState::Stray,
        };
        let (name, platform) = match store.endpoint(*id) {
            Ok(endpoint) => (endpoint.name, endpoint.platform.to_string()),
            Err(err) if err.is_not_found() => ("(unknown)".to_string(), "-".to_string()),
            Err(err) => return Err(err).context("failed to load endpoint"),
        };
        let status = stack
            .status
            .get(id)
            .map(|s| match &s.message {
                Some(message) => format!("{}: {message}", s.kind),
                None => s.kind.to_string(),
            })
            .unwrap_or_else(|| "-".to_string());
        rows.push(EndpointRow {
            id: *id,
            name,
            platform,
            status,
            relation,
        });
    }
    Ok(rows)
}

fn print_stack(stack: &Stack, pending: Option<&PendingSync>, rows: Vec<EndpointRow>) {
    println!(
        "{} {} | version {} | {}",
        format!("stack {}", stack.id).bold(),
        stack.name,
        stack.version,
        stack.deployment_type,
    );
    let groups: Vec<String> = stack.edge_groups.iter().map(ToString::to_string).collect();
    println!("  groups:      {}", or_dash(&groups.join(", ")));
    println!("  entry point: {}", or_dash(&stack.entry_point));
    println!("  manifest:    {}", or_dash(&stack.manifest_path));
    println!("  files:       {}", stack.project_path.display());

    if let Some(pending) = pending {
        println!(
            "{} relation sync interrupted at {} (+{} / -{}); run 'fleetstack reconcile {}'",
            "!".yellow().bold(),
            pending.recorded_at.to_rfc3339(),
            pending.to_add.len(),
            pending.to_remove.len(),
            stack.id,
        );
    }

    if rows.is_empty() {
        println!("No target endpoints.");
        return;
    }
    let drift = rows.iter().any(|r| r.relation != RelationState::Ok);
    let table_rows: Vec<EndpointTableRow> = rows
        .into_iter()
        .map(|row| EndpointTableRow {
            id: row.id.0,
            name: row.name,
            platform: row.platform,
            status: row.status,
            relation: row.relation.label(),
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    if drift {
        println!("Run 'fleetstack reconcile {}' to repair relations.", stack.id);
    }
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}
