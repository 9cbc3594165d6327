//! Error types for fleetstack-sync.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use fleetstack_core::{EdgeGroupId, EndpointId, StackId, StoreError};

/// Stage of an update an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validation,
    Resolution,
    Diff,
    Artifact,
    Commit,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Validation => write!(f, "validation"),
            Phase::Resolution => write!(f, "resolution"),
            Phase::Diff => write!(f, "relation diff"),
            Phase::Artifact => write!(f, "artifact placement"),
            Phase::Commit => write!(f, "commit"),
        }
    }
}

/// Group membership could not be resolved against the fleet snapshot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("edge group {0} not found")]
    UnknownGroup(EdgeGroupId),
}

/// A relation diff stopped part-way. `applied` lists the endpoints whose
/// records were already written; the journal entry for the stack is kept.
#[derive(Debug, Error)]
#[error(
    "relation sync for stack {stack} stopped at endpoint {endpoint} after {} of {planned} writes: {source}",
    .applied.len()
)]
pub struct RelationSyncError {
    pub stack: StackId,
    pub endpoint: EndpointId,
    pub applied: Vec<EndpointId>,
    pub planned: usize,
    #[source]
    pub source: StoreError,
}

/// Failures of the artifact storage collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File or folder names must stay inside the stack folder.
    #[error("invalid artifact name '{0}'")]
    InvalidName(String),
}

/// Compose → Kubernetes manifest conversion failures.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("compose content is not valid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("invalid compose file: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error("compose file defines no services")]
    NoServices,

    #[error("service '{service}' has no image")]
    MissingImage { service: String },

    #[error("invalid port mapping '{spec}' in service '{service}'")]
    InvalidPort { service: String, spec: String },

    #[error("unparseable command in service '{service}': {source}")]
    InvalidCommand {
        service: String,
        #[source]
        source: shell_words::ParseError,
    },

    /// Nothing of the service name survives as a Kubernetes object name.
    #[error("service name '{service}' yields an empty resource name")]
    InvalidServiceName { service: String },

    #[error("manifest serialization error: {0}")]
    Serialize(#[source] serde_yaml::Error),
}

/// All errors an update can end with.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Request rejected before anything was read or written.
    #[error("invalid update request: {0}")]
    Validation(String),

    #[error("{phase}: {source}")]
    NotFound {
        phase: Phase,
        #[source]
        source: StoreError,
    },

    #[error("membership resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Relations(#[from] RelationSyncError),

    #[error(
        "stack {stack} cannot deploy a Kubernetes manifest to docker endpoint(s) {}",
        join_ids(.endpoints)
    )]
    TypeConflict {
        stack: StackId,
        endpoints: Vec<EndpointId>,
    },

    #[error("artifact storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("manifest conversion failed: {0}")]
    Conversion(#[from] ConvertError),

    #[error("{phase} failed: {source}")]
    Persistence {
        phase: Phase,
        #[source]
        source: StoreError,
    },
}

impl UpdateError {
    /// Classify a store failure raised during `phase`.
    pub(crate) fn store(phase: Phase, source: StoreError) -> Self {
        if source.is_not_found() {
            UpdateError::NotFound { phase, source }
        } else {
            UpdateError::Persistence { phase, source }
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            UpdateError::Validation(_) => Phase::Validation,
            UpdateError::NotFound { phase, .. } | UpdateError::Persistence { phase, .. } => *phase,
            UpdateError::Resolution(_) => Phase::Resolution,
            UpdateError::Relations(_) => Phase::Diff,
            UpdateError::TypeConflict { .. }
            | UpdateError::Storage(_)
            | UpdateError::Conversion(_) => Phase::Artifact,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            UpdateError::NotFound { .. } => true,
            UpdateError::Resolution(ResolutionError::UnknownGroup(_)) => true,
            UpdateError::Relations(e) => e.source.is_not_found(),
            _ => false,
        }
    }
}

fn join_ids(ids: &[EndpointId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience constructor for [`StorageError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.into(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetstack_core::RecordKind;

    #[test]
    fn store_errors_split_into_not_found_and_persistence() {
        let missing = UpdateError::store(Phase::Commit, StoreError::not_found(RecordKind::Stack, 7u32));
        assert!(matches!(missing, UpdateError::NotFound { phase: Phase::Commit, .. }));
        assert!(missing.is_not_found());
        assert_eq!(missing.to_string(), "commit: stack 7 not found");

        let io = UpdateError::store(Phase::Commit, StoreError::HomeNotFound);
        assert!(matches!(io, UpdateError::Persistence { .. }));
        assert!(!io.is_not_found());
    }

    #[test]
    fn type_conflict_lists_endpoints() {
        let err = UpdateError::TypeConflict {
            stack: StackId(7),
            endpoints: vec![EndpointId(1), EndpointId(2)],
        };
        assert_eq!(err.phase(), Phase::Artifact);
        assert!(err.to_string().ends_with("docker endpoint(s) 1, 2"));
    }

    #[test]
    fn relation_error_reports_progress() {
        let err = RelationSyncError {
            stack: StackId(7),
            endpoint: EndpointId(4),
            applied: vec![EndpointId(1)],
            planned: 3,
            source: StoreError::not_found(RecordKind::EndpointRelation, 4u32),
        };
        let msg = err.to_string();
        assert!(msg.contains("after 1 of 3 writes"), "got: {msg}");
        assert!(UpdateError::from(err).is_not_found());
    }
}
