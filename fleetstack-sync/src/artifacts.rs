//! Placement of a stack's deployable files.
//!
//! | Target type  | Writes                                                      |
//! |--------------|-------------------------------------------------------------|
//! | Compose      | entry point; plus a converted manifest if any target is a   |
//! |              | Kubernetes endpoint (manifest path cleared otherwise)       |
//! | Kubernetes   | manifest only; rejected if any target is a docker endpoint  |
//!
//! A deployment-type switch first purges the stack folder (best-effort) and
//! forgets both file names, then proceeds as above with the new type.
//!
//! Placement is two steps: [`ArtifactManager::plan`] checks targets and
//! converts in memory, [`ArtifactManager::place`] purges and writes.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use fleetstack_core::config::{COMPOSE_FILE_DEFAULT_NAME, MANIFEST_FILE_DEFAULT_NAME};
use fleetstack_core::{DeploymentType, EndpointId, RelationConfig, StackId, Transition};

use crate::convert::ManifestConverter;
use crate::error::UpdateError;
use crate::storage::{FileStorage, WriteResult};

/// Endpoints a stack targets, split by platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Targets {
    pub container_runtime: Vec<EndpointId>,
    pub orchestrator: Vec<EndpointId>,
}

impl Targets {
    /// Classify `endpoints` using the platforms recorded in `config`.
    /// Endpoints missing from the snapshot are ignored.
    pub fn classify(endpoints: &BTreeSet<EndpointId>, config: &RelationConfig) -> Targets {
        let mut targets = Targets::default();
        for endpoint in endpoints.iter().filter_map(|id| config.endpoint(*id)) {
            if endpoint.platform.is_container_runtime() {
                targets.container_runtime.push(endpoint.id);
            } else {
                targets.orchestrator.push(endpoint.id);
            }
        }
        targets
    }

    pub fn has_orchestrator(&self) -> bool {
        !self.orchestrator.is_empty()
    }
}

/// Reject a Kubernetes stack aimed at any docker endpoint.
pub fn check_targets(
    stack: StackId,
    deployment_type: DeploymentType,
    targets: &Targets,
) -> Result<(), UpdateError> {
    if deployment_type == DeploymentType::Kubernetes && !targets.container_runtime.is_empty() {
        return Err(UpdateError::TypeConflict {
            stack,
            endpoints: targets.container_runtime.clone(),
        });
    }
    Ok(())
}

/// Inputs for [`ArtifactManager::plan`].
#[derive(Debug, Clone)]
pub struct ArtifactRequest<'a> {
    pub stack_id: StackId,
    pub previous_type: DeploymentType,
    pub deployment_type: DeploymentType,
    /// Currently persisted names; empty when unset.
    pub entry_point: &'a str,
    pub manifest_path: &'a str,
    pub project_path: &'a Path,
    pub content: &'a [u8],
}

/// Everything an update will write, worked out without touching storage.
///
/// Building a plan runs the type check and the compose conversion, so a bad
/// request fails here before any relation record or file is changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPlan {
    pub stack_id: StackId,
    pub transition: Transition,
    /// Directory purged before writing; set on a type switch.
    pub purge: Option<PathBuf>,
    pub entry_point: String,
    pub manifest_path: String,
    files: Vec<(String, Vec<u8>)>,
}

impl ArtifactPlan {
    /// File names in write order.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|(name, _)| name.as_str())
    }
}

/// File names to persist on the stack after placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedArtifacts {
    pub entry_point: String,
    pub manifest_path: String,
    pub transition: Transition,
    pub writes: Vec<WriteResult>,
}

pub struct ArtifactManager<'a, F, C> {
    storage: &'a F,
    converter: &'a C,
    compose_file_name: String,
    manifest_file_name: String,
}

impl<'a, F: FileStorage, C: ManifestConverter> ArtifactManager<'a, F, C> {
    pub fn new(storage: &'a F, converter: &'a C) -> Self {
        Self {
            storage,
            converter,
            compose_file_name: COMPOSE_FILE_DEFAULT_NAME.to_string(),
            manifest_file_name: MANIFEST_FILE_DEFAULT_NAME.to_string(),
        }
    }

    /// Names used when a stack has no entry point / manifest yet.
    pub fn with_default_names(mut self, compose: &str, manifest: &str) -> Self {
        self.compose_file_name = compose.to_string();
        self.manifest_file_name = manifest.to_string();
        self
    }

    pub fn plan(
        &self,
        request: &ArtifactRequest<'_>,
        targets: &Targets,
    ) -> Result<ArtifactPlan, UpdateError> {
        check_targets(request.stack_id, request.deployment_type, targets)?;

        let transition =
            DeploymentType::transition(request.previous_type, request.deployment_type);
        let mut entry_point = request.entry_point.to_string();
        let mut manifest_path = request.manifest_path.to_string();
        let mut purge = None;
        if transition.is_switch() {
            purge = Some(self.stack_dir(request.project_path, request.stack_id));
            entry_point.clear();
            manifest_path.clear();
        }

        let mut files = Vec::new();
        match transition.target() {
            DeploymentType::Compose => {
                if entry_point.is_empty() {
                    entry_point = self.compose_file_name.clone();
                }
                files.push((entry_point.clone(), request.content.to_vec()));

                if targets.has_orchestrator() {
                    let manifest = self.converter.convert(request.content)?;
                    if manifest_path.is_empty() {
                        manifest_path = self.manifest_file_name.clone();
                    }
                    files.push((manifest_path.clone(), manifest));
                    tracing::debug!(
                        stack = %request.stack_id,
                        orchestrators = targets.orchestrator.len(),
                        "converted compose file to manifest"
                    );
                } else {
                    manifest_path.clear();
                }
            }
            DeploymentType::Kubernetes => {
                if manifest_path.is_empty() {
                    manifest_path = self.manifest_file_name.clone();
                }
                files.push((manifest_path.clone(), request.content.to_vec()));
            }
        }

        Ok(ArtifactPlan {
            stack_id: request.stack_id,
            transition,
            purge,
            entry_point,
            manifest_path,
            files,
        })
    }

    /// Carry out `plan`: purge on a type switch (best-effort), then write.
    pub fn place(&self, plan: ArtifactPlan) -> Result<PlacedArtifacts, UpdateError> {
        let stack = plan.stack_id;
        if let Some(dir) = &plan.purge {
            if let Err(err) = self.storage.remove_directory(dir) {
                tracing::warn!(
                    stack = %stack,
                    path = %dir.display(),
                    error = %err,
                    "unable to clear old stack files"
                );
            }
        }
        if let Transition::Switched { from, to } = plan.transition {
            tracing::info!(stack = %stack, %from, %to, "deployment type changed");
        }

        let folder = stack.folder_key();
        let mut writes = Vec::with_capacity(plan.files.len());
        for (name, content) in &plan.files {
            writes.push(self.storage.store_file(&folder, name, content)?);
        }

        Ok(PlacedArtifacts {
            entry_point: plan.entry_point,
            manifest_path: plan.manifest_path,
            transition: plan.transition,
            writes,
        })
    }

    fn stack_dir(&self, project_path: &Path, stack: StackId) -> PathBuf {
        if project_path.as_os_str().is_empty() {
            self.storage.folder_path(&stack.folder_key())
        } else {
            project_path.to_path_buf()
        }
    }
}
