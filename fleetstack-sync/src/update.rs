//! Stack update entrypoint used by the CLI.
//!
//! Order of operations:
//!
//! 1. Validate the request.
//! 2. Load the stack and one fleet snapshot.
//! 3. Resolve the current and candidate endpoint sets.
//! 4. Plan artifacts: reject a Kubernetes stack aimed at docker endpoints and
//!    convert compose content in memory.
//! 5. Synchronize relation records.
//! 6. Write artifacts.
//! 7. Commit the stack record.
//! 8. Settle the relation journal.
//!
//! Steps 1–4 touch nothing, so a rejected request leaves the stack, its
//! relations and its files as they were. A failure in 5–7 leaves the journal
//! behind for the next update or `reconcile`.

use std::collections::BTreeSet;

use fleetstack_core::{
    DataStore, DeploymentType, EdgeGroupId, EndpointId, Settings, Stack, StackId, Transition,
};

use crate::artifacts::{ArtifactManager, ArtifactRequest, Targets};
use crate::convert::ManifestConverter;
use crate::error::{Phase, UpdateError};
use crate::membership;
use crate::mutator::{self, StackChanges};
use crate::relations::{RelationDiff, RelationSynchronizer};
use crate::storage::{FileStorage, WriteResult};

/// A client's request to change a stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateStackRequest {
    pub stack_id: StackId,
    pub content: Vec<u8>,
    /// `None` keeps the stack's current groups.
    pub edge_groups: Option<Vec<EdgeGroupId>>,
    pub deployment_type: DeploymentType,
    pub bump_version: bool,
    pub use_manifest_namespaces: bool,
}

impl UpdateStackRequest {
    pub fn validate(&self) -> Result<(), UpdateError> {
        if self.content.iter().all(u8::is_ascii_whitespace) {
            return Err(UpdateError::Validation(
                "stack file content is empty".to_string(),
            ));
        }
        if let Some(groups) = &self.edge_groups {
            if groups.is_empty() {
                return Err(UpdateError::Validation(
                    "at least one edge group is required".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Requested groups in first-seen order with duplicates dropped.
    fn groups(&self) -> Option<Vec<EdgeGroupId>> {
        self.edge_groups.as_ref().map(|groups| {
            let mut seen = BTreeSet::new();
            groups.iter().copied().filter(|g| seen.insert(*g)).collect()
        })
    }
}

/// Everything one update did, for callers that report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub stack: Stack,
    pub relations: RelationDiff,
    pub transition: Transition,
    pub writes: Vec<WriteResult>,
}

pub struct StackUpdater<'a, S, F, C> {
    store: &'a S,
    relations: RelationSynchronizer<'a, S>,
    artifacts: ArtifactManager<'a, F, C>,
}

impl<'a, S, F, C> StackUpdater<'a, S, F, C>
where
    S: DataStore,
    F: FileStorage,
    C: ManifestConverter,
{
    pub fn new(store: &'a S, storage: &'a F, converter: &'a C) -> Self {
        Self {
            store,
            relations: RelationSynchronizer::new(store),
            artifacts: ArtifactManager::new(storage, converter),
        }
    }

    /// Apply file-name defaults and the relation retry budget from `settings`.
    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.relations = self
            .relations
            .with_write_attempts(settings.relation_write_attempts);
        self.artifacts = self
            .artifacts
            .with_default_names(&settings.compose_file_name, &settings.manifest_file_name);
        self
    }

    /// Update a stack and return the committed record.
    pub fn update(&self, request: UpdateStackRequest) -> Result<Stack, UpdateError> {
        self.run(request).map(|report| report.stack)
    }

    /// As [`update`](Self::update), also reporting relation and file changes.
    pub fn run(&self, request: UpdateStackRequest) -> Result<UpdateReport, UpdateError> {
        request.validate()?;
        let id = request.stack_id;

        let stack = self
            .store
            .stack(id)
            .map_err(|e| UpdateError::store(Phase::Resolution, e))?;
        let config = self
            .store
            .relation_config()
            .map_err(|e| UpdateError::store(Phase::Resolution, e))?;

        let current = membership::resolve(&stack.edge_groups, &config)?;
        let requested = request.groups();
        let (edge_groups, candidate): (Vec<EdgeGroupId>, BTreeSet<EndpointId>) = match requested {
            Some(groups) => {
                let endpoints = membership::resolve(&groups, &config)?;
                (groups, endpoints)
            }
            None => (stack.edge_groups.clone(), current.clone()),
        };

        let targets = Targets::classify(&candidate, &config);
        let plan = self.artifacts.plan(
            &ArtifactRequest {
                stack_id: id,
                previous_type: stack.deployment_type,
                deployment_type: request.deployment_type,
                entry_point: &stack.entry_point,
                manifest_path: &stack.manifest_path,
                project_path: &stack.project_path,
                content: &request.content,
            },
            &targets,
        )?;
        tracing::debug!(
            stack = %id,
            files = ?plan.file_names().collect::<Vec<_>>(),
            "artifacts planned"
        );

        // Kept groups give an empty diff unless an unsettled journal remains.
        let relations = self.relations.synchronize(id, &current, &candidate)?;

        let placed = self.artifacts.place(plan)?;

        let committed = mutator::apply(
            self.store,
            id,
            StackChanges {
                deployment_type: request.deployment_type,
                entry_point: placed.entry_point,
                manifest_path: placed.manifest_path,
                edge_groups,
                num_deployments: candidate.len(),
                bump_version: request.bump_version,
                use_manifest_namespaces: request.use_manifest_namespaces,
            },
        )?;
        self.relations.settle(id);

        tracing::info!(
            stack = %id,
            version = committed.version,
            endpoints = committed.num_deployments,
            added = relations.added.len(),
            removed = relations.removed.len(),
            "stack updated"
        );

        Ok(UpdateReport {
            stack: committed,
            relations,
            transition: placed.transition,
            writes: placed.writes,
        })
    }
}
