//! `fleetstack reconcile` — repair endpoint relations from stack groups.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use fleetstack_core::{DataStore, StackId};
use fleetstack_sync::{RelationDiff, RelationSynchronizer};

use crate::Env;

/// Arguments for `fleetstack reconcile`.
#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Stack id (omit when using `--all`).
    pub stack: Option<u32>,

    /// Reconcile every stack.
    #[arg(long, conflicts_with = "stack")]
    pub all: bool,
}

impl ReconcileArgs {
    pub fn run(self, env: &Env) -> Result<()> {
        let store = &env.store;
        let synchronizer = RelationSynchronizer::new(store)
            .with_write_attempts(env.settings.relation_write_attempts);

        if !self.all {
            let stack = StackId(self.stack.context("provide a stack id or use --all")?);
            let diff = synchronizer
                .reconcile(stack)
                .with_context(|| format!("reconcile failed for stack {stack}"))?;
            print_result(stack, &diff);
            return Ok(());
        }

        let stacks = store.list_stacks().context("failed to list stacks")?;
        if stacks.is_empty() {
            println!("No stacks found.");
            return Ok(());
        }

        let mut failed = Vec::new();
        for stack in stacks {
            let pending = store
                .pending_sync(stack.id)
                .with_context(|| format!("failed to read journal for stack {}", stack.id))?;
            if pending.is_some() {
                tracing::info!(stack = %stack.id, "stack has an interrupted relation sync");
            }
            match synchronizer.reconcile(stack.id) {
                Ok(diff) => print_result(stack.id, &diff),
                Err(err) => {
                    println!("{} stack {}: {err}", "✗".red(), stack.id);
                    failed.push(stack.id.to_string());
                }
            }
        }

        if !failed.is_empty() {
            bail!("reconcile failed for stack(s) {}", failed.join(", "));
        }
        Ok(())
    }
}

fn print_result(stack: StackId, diff: &RelationDiff) {
    if diff.is_empty() {
        println!("✓ stack {stack} — relations consistent");
        return;
    }
    println!(
        "✓ stack {stack} repaired (+{} / -{})",
        diff.added.len(),
        diff.removed.len()
    );
    for endpoint in &diff.added {
        println!("  +  endpoint {endpoint}");
    }
    for endpoint in &diff.removed {
        println!("  -  endpoint {endpoint}");
    }
}
