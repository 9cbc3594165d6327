//! Final commit of an update onto the persisted stack record.

use fleetstack_core::{DataStore, DeploymentType, EdgeGroupId, Stack, StackId};

use crate::error::{Phase, UpdateError};

/// Everything an update changes on the stack record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackChanges {
    pub deployment_type: DeploymentType,
    pub entry_point: String,
    pub manifest_path: String,
    pub edge_groups: Vec<EdgeGroupId>,
    pub num_deployments: usize,
    /// Reset per-endpoint status and increment the version.
    pub bump_version: bool,
    pub use_manifest_namespaces: bool,
}

impl StackChanges {
    pub fn apply_to(self, stack: &mut Stack) {
        stack.deployment_type = self.deployment_type;
        stack.entry_point = self.entry_point;
        stack.manifest_path = self.manifest_path;
        stack.edge_groups = self.edge_groups;
        stack.num_deployments = self.num_deployments;
        stack.use_manifest_namespaces = self.use_manifest_namespaces;

        if self.bump_version {
            stack.status.clear();
            stack.version = stack.version.saturating_add(1);
        }
    }
}

/// Persist `changes` on stack `id` in one read-modify-write and return the
/// committed record.
pub fn apply<S: DataStore>(
    store: &S,
    id: StackId,
    changes: StackChanges,
) -> Result<Stack, UpdateError> {
    let bump = changes.bump_version;
    let stack = store
        .update_stack_with(id, |stack| changes.apply_to(stack))
        .map_err(|e| UpdateError::store(Phase::Commit, e))?;
    tracing::debug!(stack = %id, version = stack.version, bump, "stack committed");
    Ok(stack)
}
