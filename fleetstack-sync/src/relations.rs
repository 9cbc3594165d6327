//! Incremental maintenance of the endpoint → stack reverse index.
//!
//! ## Write protocol
//!
//! 1. Diff old vs. new endpoint sets; an empty diff writes nothing.
//! 2. Journal the planned adds/removes as a [`PendingSync`].
//! 3. Remove the stack from every endpoint in `old − new`.
//! 4. Flag the stack on every endpoint in `new − old`.
//! 5. Once the caller has committed the stack record,
//!    [`RelationSynchronizer::settle`] clears the journal.
//!
//! Each relation write is a compare-and-swap read-modify-write; losing a race
//! re-reads the record and reapplies the single-key change. A failure anywhere
//! before step 5 leaves the journal in place so
//! [`RelationSynchronizer::reconcile`] can restore the invariant later.
//!
//! While a journal is present the caller's `old` set may not match the
//! records, so the next synchronize diffs against a scan of the relation
//! records instead.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use fleetstack_core::{DataStore, EndpointId, PendingSync, StackId, StoreError};

use crate::error::{Phase, RelationSyncError, UpdateError};
use crate::membership;

/// Endpoints whose relation records gained or lost a stack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationDiff {
    pub added: BTreeSet<EndpointId>,
    pub removed: BTreeSet<EndpointId>,
}

impl RelationDiff {
    pub fn between(old: &BTreeSet<EndpointId>, new: &BTreeSet<EndpointId>) -> RelationDiff {
        RelationDiff {
            added: new.difference(old).copied().collect(),
            removed: old.difference(new).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Number of relation writes this diff needs.
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len()
    }
}

pub struct RelationSynchronizer<'a, S> {
    store: &'a S,
    write_attempts: u32,
}

impl<'a, S: DataStore> RelationSynchronizer<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            write_attempts: 3,
        }
    }

    /// Attempts per relation write before a revision conflict is surfaced.
    pub fn with_write_attempts(mut self, attempts: u32) -> Self {
        self.write_attempts = attempts.max(1);
        self
    }

    /// Move `stack` from the `old` endpoint set to the `new` one, touching only
    /// the endpoints in the symmetric difference.
    ///
    /// If an earlier sync for `stack` never settled, `old` is replaced by the
    /// endpoints the relation records actually flag.
    pub fn synchronize(
        &self,
        stack: StackId,
        old: &BTreeSet<EndpointId>,
        new: &BTreeSet<EndpointId>,
    ) -> Result<RelationDiff, UpdateError> {
        let pending = self
            .store
            .pending_sync(stack)
            .map_err(|e| UpdateError::store(Phase::Diff, e))?;
        let scanned;
        let old = match &pending {
            Some(journal) => {
                tracing::warn!(
                    stack = %stack,
                    recorded_at = %journal.recorded_at.to_rfc3339(),
                    "previous relation sync unsettled; diffing against relation records"
                );
                scanned = self.flagged(stack)?;
                &scanned
            }
            None => old,
        };

        let diff = RelationDiff::between(old, new);
        if diff.is_empty() {
            tracing::debug!(stack = %stack, "relations unchanged");
            return Ok(diff);
        }
        self.apply(stack, &diff, pending.map(|journal| journal.recorded_at))?;
        Ok(diff)
    }

    /// Drop `stack`'s journal after its stack record has been committed.
    pub fn settle(&self, stack: StackId) {
        if let Err(err) = self.store.clear_pending_sync(stack) {
            tracing::warn!(stack = %stack, error = %err, "unable to clear relation journal");
        }
    }

    /// Recompute `stack`'s relations from its persisted groups and repair any
    /// drift, e.g. after an interrupted [`synchronize`](Self::synchronize).
    ///
    /// Also refreshes the stack's deployment count and clears its journal.
    pub fn reconcile(&self, stack_id: StackId) -> Result<RelationDiff, UpdateError> {
        let stack = self
            .store
            .stack(stack_id)
            .map_err(|e| UpdateError::store(Phase::Resolution, e))?;
        let config = self
            .store
            .relation_config()
            .map_err(|e| UpdateError::store(Phase::Resolution, e))?;
        let desired = membership::resolve(&stack.edge_groups, &config)?;

        let actual = self.flagged(stack_id)?;

        let diff = RelationDiff::between(&actual, &desired);
        if !diff.is_empty() {
            tracing::info!(
                stack = %stack_id,
                added = diff.added.len(),
                removed = diff.removed.len(),
                "repairing relation drift"
            );
            self.apply(stack_id, &diff, None)?;
        }

        self.store
            .update_stack_with(stack_id, |s| s.num_deployments = desired.len())
            .map_err(|e| UpdateError::store(Phase::Commit, e))?;
        self.store
            .clear_pending_sync(stack_id)
            .map_err(|e| UpdateError::store(Phase::Commit, e))?;
        Ok(diff)
    }

    /// Endpoints whose relation records currently flag `stack`.
    fn flagged(&self, stack: StackId) -> Result<BTreeSet<EndpointId>, UpdateError> {
        Ok(self
            .store
            .endpoint_relations()
            .map_err(|e| UpdateError::store(Phase::Diff, e))?
            .into_iter()
            .filter(|relation| relation.targets(stack))
            .map(|relation| relation.endpoint_id)
            .collect())
    }

    /// Journal and write `diff`. `since` keeps an unsettled journal's timestamp.
    fn apply(
        &self,
        stack: StackId,
        diff: &RelationDiff,
        since: Option<DateTime<Utc>>,
    ) -> Result<(), UpdateError> {
        let pending = PendingSync {
            stack_id: stack,
            to_add: diff.added.clone(),
            to_remove: diff.removed.clone(),
            recorded_at: since.unwrap_or_else(Utc::now),
        };
        self.store
            .save_pending_sync(&pending)
            .map_err(|e| UpdateError::store(Phase::Diff, e))?;

        let planned = diff.len();
        let mut applied = Vec::with_capacity(planned);
        let writes = diff
            .removed
            .iter()
            .map(|id| (*id, false))
            .chain(diff.added.iter().map(|id| (*id, true)));
        for (endpoint, flag) in writes {
            if let Err(source) = self.write_flag(endpoint, stack, flag) {
                tracing::error!(
                    stack = %stack,
                    endpoint = %endpoint,
                    applied = applied.len(),
                    planned,
                    error = %source,
                    "relation sync interrupted; journal kept for reconciliation"
                );
                return Err(RelationSyncError {
                    stack,
                    endpoint,
                    applied,
                    planned,
                    source,
                }
                .into());
            }
            applied.push(endpoint);
        }

        tracing::info!(
            stack = %stack,
            added = diff.added.len(),
            removed = diff.removed.len(),
            "relations synchronized"
        );
        Ok(())
    }

    /// Set (`true`) or drop (`false`) the stack's entry on one endpoint.
    fn write_flag(&self, endpoint: EndpointId, stack: StackId, flag: bool) -> Result<(), StoreError> {
        let mut attempt = 1;
        loop {
            let mut relation = self.store.endpoint_relation(endpoint)?;
            if flag {
                relation.stacks.insert(stack, true);
            } else {
                relation.stacks.remove(&stack);
            }
            match self.store.update_endpoint_relation(&relation) {
                Ok(_) => return Ok(()),
                Err(StoreError::RevisionConflict { found, .. }) if attempt < self.write_attempts => {
                    tracing::debug!(
                        endpoint = %endpoint,
                        attempt,
                        revision = found,
                        "relation changed underneath us; retrying"
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
