//! # fleetstack-sync
//!
//! Stack update orchestration: group membership, endpoint relation sync,
//! artifact placement and the final stack commit.
//!
//! Call [`StackUpdater::update`] to apply an [`UpdateStackRequest`], or
//! [`RelationSynchronizer::reconcile`] to repair a stack's relation records.

pub mod artifacts;
pub mod convert;
pub mod error;
pub mod membership;
pub mod mutator;
pub mod relations;
pub mod storage;
pub mod update;

#[cfg(test)]
mod test_support;

pub use artifacts::{ArtifactManager, ArtifactPlan, ArtifactRequest, PlacedArtifacts, Targets};
pub use convert::{ComposeConverter, ManifestConverter};
pub use error::{
    ConvertError, Phase, RelationSyncError, ResolutionError, StorageError, UpdateError,
};
pub use mutator::StackChanges;
pub use relations::{RelationDiff, RelationSynchronizer};
pub use storage::{FileStorage, LocalStorage, WriteResult};
pub use update::{StackUpdater, UpdateReport, UpdateStackRequest};
