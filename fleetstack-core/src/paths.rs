//! On-disk layout under `<home>/.fleetstack/`.
//!
//! ```text
//! ~/.fleetstack/
//!   config.yaml
//!   fleet.yaml                  (endpoints, endpoint groups, edge groups)
//!   stacks/<stack_id>.yaml
//!   relations/<endpoint_id>.yaml
//!   journal/<stack_id>.yaml     (pending relation syncs)
//!   edge_stacks/<stack_id>/     (stack artifacts)
//! ```

use std::path::{Path, PathBuf};

use crate::types::{EndpointId, StackId};

pub const CONFIG_FILE: &str = "config.yaml";
pub const FLEET_FILE: &str = "fleet.yaml";
pub const EDGE_STACKS_DIR: &str = "edge_stacks";

pub fn fleetstack_root(home: &Path) -> PathBuf {
    home.join(".fleetstack")
}

pub fn config_path(home: &Path) -> PathBuf {
    fleetstack_root(home).join(CONFIG_FILE)
}

pub fn fleet_path(home: &Path) -> PathBuf {
    fleetstack_root(home).join(FLEET_FILE)
}

pub fn stacks_dir(home: &Path) -> PathBuf {
    fleetstack_root(home).join("stacks")
}

pub fn stack_path(home: &Path, id: StackId) -> PathBuf {
    stacks_dir(home).join(format!("{id}.yaml"))
}

pub fn relations_dir(home: &Path) -> PathBuf {
    fleetstack_root(home).join("relations")
}

pub fn relation_path(home: &Path, id: EndpointId) -> PathBuf {
    relations_dir(home).join(format!("{id}.yaml"))
}

pub fn journal_dir(home: &Path) -> PathBuf {
    fleetstack_root(home).join("journal")
}

pub fn journal_path(home: &Path, id: StackId) -> PathBuf {
    journal_dir(home).join(format!("{id}.yaml"))
}

/// Root the artifact storage writes stack folders under.
pub fn edge_stacks_root(home: &Path) -> PathBuf {
    fleetstack_root(home).join(EDGE_STACKS_DIR)
}
