//! Edge group → endpoint resolution against a fleet snapshot.
//!
//! Resolution never touches the store: callers fetch one [`RelationConfig`]
//! and resolve both the current and the candidate membership against it, so
//! the two sets are always comparable.

use std::collections::BTreeSet;

use fleetstack_core::{EdgeGroup, EdgeGroupId, Endpoint, EndpointId, Membership, RelationConfig};

use crate::error::ResolutionError;

/// Resolve the union of endpoints reachable from `group_ids`.
pub fn resolve(
    group_ids: &[EdgeGroupId],
    config: &RelationConfig,
) -> Result<BTreeSet<EndpointId>, ResolutionError> {
    let mut resolved = BTreeSet::new();
    for id in group_ids {
        let group = config
            .edge_group(*id)
            .ok_or(ResolutionError::UnknownGroup(*id))?;
        resolved.extend(
            config
                .endpoints
                .iter()
                .filter(|endpoint| group_contains(group, endpoint, config))
                .map(|endpoint| endpoint.id),
        );
    }
    Ok(resolved)
}

/// Whether `endpoint` belongs to `group` in this snapshot.
///
/// Static lists only count endpoints still in the fleet, which falls out of
/// iterating the snapshot's endpoints rather than the stored list.
pub fn group_contains(group: &EdgeGroup, endpoint: &Endpoint, config: &RelationConfig) -> bool {
    match &group.membership {
        Membership::Static { endpoints } => endpoints.contains(&endpoint.id),
        Membership::Dynamic {
            tag_ids,
            partial_match,
        } => {
            if tag_ids.is_empty() {
                return false;
            }
            let mut tags: BTreeSet<_> = endpoint.tag_ids.iter().copied().collect();
            if let Some(endpoint_group) = config.endpoint_group(endpoint.group_id) {
                tags.extend(endpoint_group.tag_ids.iter().copied());
            }
            if *partial_match {
                tag_ids.iter().any(|t| tags.contains(t))
            } else {
                tag_ids.iter().all(|t| tags.contains(t))
            }
        }
    }
}
