//! Error types for fleetstack-core.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::EndpointId;

/// Kind of record a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Stack,
    Endpoint,
    EndpointRelation,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Stack => write!(f, "stack"),
            RecordKind::Endpoint => write!(f, "endpoint"),
            RecordKind::EndpointRelation => write!(f, "endpoint relation"),
        }
    }
}

/// All errors that can arise from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse record at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None` — cannot locate `~/.fleetstack/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    #[error("{kind} {id} not found")]
    NotFound { kind: RecordKind, id: u32 },

    /// Compare-and-swap on an endpoint relation lost against another writer.
    #[error(
        "endpoint relation {endpoint} changed concurrently (expected revision {expected}, found {found})"
    )]
    RevisionConflict {
        endpoint: EndpointId,
        expected: u64,
        found: u64,
    },
}

impl StoreError {
    pub fn not_found(kind: RecordKind, id: impl Into<u32>) -> Self {
        StoreError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
