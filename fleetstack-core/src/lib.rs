//! fleetstack core library — domain types, record persistence, settings, errors.
//!
//! - [`types`] — id newtypes, stacks, fleet snapshot, relation records
//! - [`store`] — [`DataStore`] interface and the YAML [`FileStore`]
//! - [`config`] — [`Settings`] from `~/.fleetstack/config.yaml`
//! - [`paths`] — on-disk layout
//! - [`error`] — [`StoreError`]

pub mod config;
pub mod error;
pub mod paths;
pub mod store;
pub mod types;

pub use config::Settings;
pub use error::{RecordKind, StoreError};
pub use store::{DataStore, FileStore};
pub use types::{
    DeploymentType, EdgeGroup, EdgeGroupId, Endpoint, EndpointGroup, EndpointGroupId,
    EndpointId, EndpointRelation, EndpointStatus, Membership, PendingSync, Platform,
    RelationConfig, Stack, StackId, StatusKind, TagId, Transition,
};
