//! Domain types for stacks, endpoints, groups and their relations.
//!
//! All identifiers are `u32` newtypes that serialize as the bare integer.
//! All types are serializable/deserializable via serde + serde_yaml.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<u32> for $name {
            fn from(v: u32) -> Self {
                Self(v)
            }
        }

        impl From<$name> for u32 {
            fn from(v: $name) -> u32 {
                v.0
            }
        }
    };
}

id_newtype!(
    /// Identifier of an edge stack.
    StackId
);
id_newtype!(
    /// Identifier of an endpoint (remote agent).
    EndpointId
);
id_newtype!(
    /// Identifier of an edge group, the unit a stack targets.
    EdgeGroupId
);
id_newtype!(
    /// Identifier of an endpoint group; endpoints inherit its tags.
    EndpointGroupId
);
id_newtype!(TagId);

impl StackId {
    /// Storage folder key for this stack's artifacts.
    pub fn folder_key(self) -> String {
        self.0.to_string()
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Artifact format a stack is stored and deployed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentType {
    #[default]
    Compose,
    Kubernetes,
}

impl DeploymentType {
    /// Transition from the persisted type to the requested one.
    pub fn transition(from: DeploymentType, to: DeploymentType) -> Transition {
        if from == to {
            Transition::Unchanged(to)
        } else {
            Transition::Switched { from, to }
        }
    }
}

impl fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentType::Compose => write!(f, "compose"),
            DeploymentType::Kubernetes => write!(f, "kubernetes"),
        }
    }
}

/// Outcome of comparing the persisted deployment type with a requested one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged(DeploymentType),
    /// Format changed: previous artifacts must be purged.
    Switched {
        from: DeploymentType,
        to: DeploymentType,
    },
}

impl Transition {
    /// The deployment type in effect after the transition.
    pub fn target(self) -> DeploymentType {
        match self {
            Transition::Unchanged(t) => t,
            Transition::Switched { to, .. } => to,
        }
    }

    pub fn is_switch(self) -> bool {
        matches!(self, Transition::Switched { .. })
    }
}

/// Workload platform an endpoint runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Plain container runtime; can only run compose stacks.
    #[default]
    Docker,
    /// Orchestrator-native; needs a Kubernetes manifest.
    Kubernetes,
}

impl Platform {
    pub fn is_container_runtime(self) -> bool {
        self == Platform::Docker
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Docker => write!(f, "docker"),
            Platform::Kubernetes => write!(f, "kubernetes"),
        }
    }
}

/// Last status an endpoint reported for a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    #[default]
    Pending,
    Acknowledged,
    Deployed,
    Error,
    Removed,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusKind::Pending => write!(f, "pending"),
            StatusKind::Acknowledged => write!(f, "acknowledged"),
            StatusKind::Deployed => write!(f, "deployed"),
            StatusKind::Error => write!(f, "error"),
            StatusKind::Removed => write!(f, "removed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Fleet
// ---------------------------------------------------------------------------

/// A remote execution agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub name: String,
    #[serde(default)]
    pub platform: Platform,
    pub group_id: EndpointGroupId,
    #[serde(default)]
    pub tag_ids: Vec<TagId>,
}

/// Administrative grouping of endpoints; its tags apply to every member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointGroup {
    pub id: EndpointGroupId,
    pub name: String,
    #[serde(default)]
    pub tag_ids: Vec<TagId>,
}

/// How an edge group decides which endpoints belong to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Membership {
    /// Fixed list of endpoints.
    Static {
        #[serde(default)]
        endpoints: Vec<EndpointId>,
    },
    /// Tag predicate evaluated against the fleet.
    Dynamic {
        #[serde(default)]
        tag_ids: Vec<TagId>,
        /// Any tag matches instead of all tags.
        #[serde(default)]
        partial_match: bool,
    },
}

/// A named, resolvable set of endpoints targeted by stacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeGroup {
    pub id: EdgeGroupId,
    pub name: String,
    pub membership: Membership,
}

/// Immutable snapshot of the fleet, fetched once per operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RelationConfig {
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub endpoint_groups: Vec<EndpointGroup>,
    #[serde(default)]
    pub edge_groups: Vec<EdgeGroup>,
}

impl RelationConfig {
    pub fn endpoint(&self, id: EndpointId) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.id == id)
    }

    pub fn endpoint_group(&self, id: EndpointGroupId) -> Option<&EndpointGroup> {
        self.endpoint_groups.iter().find(|g| g.id == id)
    }

    pub fn edge_group(&self, id: EdgeGroupId) -> Option<&EdgeGroup> {
        self.edge_groups.iter().find(|g| g.id == id)
    }
}

// ---------------------------------------------------------------------------
// Stack and relations
// ---------------------------------------------------------------------------

/// Status entry reported by an endpoint for the current stack version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EndpointStatus {
    pub kind: StatusKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A versioned deployable bundle and its fleet membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    pub id: StackId,
    pub name: String,
    #[serde(default)]
    pub deployment_type: DeploymentType,
    /// Compose file name; empty when unset.
    #[serde(default)]
    pub entry_point: String,
    /// Kubernetes manifest file name; empty when unset.
    #[serde(default)]
    pub manifest_path: String,
    /// Directory holding this stack's artifacts.
    pub project_path: PathBuf,
    #[serde(default)]
    pub edge_groups: Vec<EdgeGroupId>,
    pub version: u32,
    #[serde(default)]
    pub status: BTreeMap<EndpointId, EndpointStatus>,
    #[serde(default)]
    pub num_deployments: usize,
    #[serde(default)]
    pub use_manifest_namespaces: bool,
}

impl Stack {
    /// A fresh compose stack at version 1 with no artifacts or targets.
    pub fn new(id: StackId, name: impl Into<String>, project_path: PathBuf) -> Self {
        Self {
            id,
            name: name.into(),
            deployment_type: DeploymentType::Compose,
            entry_point: String::new(),
            manifest_path: String::new(),
            project_path,
            edge_groups: vec![],
            version: 1,
            status: BTreeMap::new(),
            num_deployments: 0,
            use_manifest_namespaces: false,
        }
    }
}

/// Reverse index: which stacks target a given endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRelation {
    pub endpoint_id: EndpointId,
    #[serde(default)]
    pub stacks: BTreeMap<StackId, bool>,
    /// Bumped on every successful write; used for compare-and-swap.
    #[serde(default)]
    pub revision: u64,
}

impl EndpointRelation {
    pub fn new(endpoint_id: EndpointId) -> Self {
        Self {
            endpoint_id,
            stacks: BTreeMap::new(),
            revision: 0,
        }
    }

    pub fn targets(&self, stack: StackId) -> bool {
        self.stacks.get(&stack).copied().unwrap_or(false)
    }
}

/// Journal entry for a relation diff that has not finished applying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSync {
    pub stack_id: StackId,
    #[serde(default)]
    pub to_add: BTreeSet<EndpointId>,
    #[serde(default)]
    pub to_remove: BTreeSet<EndpointId>,
    pub recorded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
