//! Shared fixtures for unit tests.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::path::PathBuf;

use tempfile::TempDir;

use fleetstack_core::{
    paths, DataStore, EdgeGroup, EdgeGroupId, Endpoint, EndpointGroup, EndpointGroupId,
    EndpointId, EndpointRelation, FileStore, Membership, PendingSync, Platform, RelationConfig,
    Stack, StackId, StoreError,
};

pub(crate) fn ids(v: &[u32]) -> BTreeSet<EndpointId> {
    v.iter().copied().map(EndpointId).collect()
}

/// Endpoints currently flagged for `stack` across all relation records.
pub(crate) fn relation_flags(store: &FileStore, stack: StackId) -> BTreeSet<EndpointId> {
    store
        .endpoint_relations()
        .expect("relations")
        .into_iter()
        .filter(|r| r.targets(stack))
        .map(|r| r.endpoint_id)
        .collect()
}

pub(crate) struct Fixture {
    pub home: TempDir,
    pub store: FileStore,
}

impl Fixture {
    /// Flag `stack` on each endpoint directly, bypassing the synchronizer.
    pub fn flag(&self, stack: StackId, endpoints: &[u32]) {
        for id in endpoints {
            let mut relation = self.store.endpoint_relation(EndpointId(*id)).expect("relation");
            relation.stacks.insert(stack, true);
            self.store.update_endpoint_relation(&relation).expect("flag");
        }
    }

    pub fn set_groups(&self, stack: StackId, groups: &[EdgeGroupId]) {
        self.store
            .update_stack_with(stack, |s| s.edge_groups = groups.to_vec())
            .expect("set groups");
    }

    pub fn stack_dir(&self, stack: StackId) -> PathBuf {
        paths::edge_stacks_root(self.home.path()).join(stack.folder_key())
    }
}

fn endpoint(id: u32, platform: Platform) -> Endpoint {
    Endpoint {
        id: EndpointId(id),
        name: format!("edge-{id}"),
        platform,
        group_id: EndpointGroupId(1),
        tag_ids: vec![],
    }
}

fn static_group(id: u32, name: &str, endpoints: &[u32]) -> EdgeGroup {
    EdgeGroup {
        id: EdgeGroupId(id),
        name: name.to_string(),
        membership: Membership::Static {
            endpoints: endpoints.iter().copied().map(EndpointId).collect(),
        },
    }
}

/// Fleet: docker endpoints 1–3, kubernetes endpoints 4–5.
///
/// Edge groups: 1 = {1,2,3}, 2 = {3,4}, 3 = {4,5}, 4 = {1,2}.
/// Stack 7 exists with groups `[1]` and no relations yet.
pub(crate) fn fixture() -> Fixture {
    let home = TempDir::new().expect("tempdir");
    let store = FileStore::open_at(home.path()).expect("open");
    store
        .save_fleet(&RelationConfig {
            endpoints: vec![
                endpoint(1, Platform::Docker),
                endpoint(2, Platform::Docker),
                endpoint(3, Platform::Docker),
                endpoint(4, Platform::Kubernetes),
                endpoint(5, Platform::Kubernetes),
            ],
            endpoint_groups: vec![EndpointGroup {
                id: EndpointGroupId(1),
                name: "unassigned".into(),
                tag_ids: vec![],
            }],
            edge_groups: vec![
                static_group(1, "A", &[1, 2, 3]),
                static_group(2, "B", &[3, 4]),
                static_group(3, "K8S", &[4, 5]),
                static_group(4, "DOCKER", &[1, 2]),
            ],
        })
        .expect("fleet");
    for id in 1..=5 {
        store.register_endpoint(EndpointId(id)).expect("register");
    }
    let mut stack = Stack::new(
        StackId(7),
        "web",
        paths::edge_stacks_root(home.path()).join("7"),
    );
    stack.edge_groups = vec![EdgeGroupId(1)];
    store.save_stack(&stack).expect("stack");
    Fixture { home, store }
}

/// [`DataStore`] wrapper that counts writes and injects failures.
pub(crate) struct RecordingStore<'a> {
    inner: &'a FileStore,
    relation_writes: Cell<usize>,
    journal_writes: Cell<usize>,
    stack_writes: Cell<usize>,
    fail_on: Option<EndpointId>,
    conflicts_left: Cell<u32>,
}

impl<'a> RecordingStore<'a> {
    /// Stack id the simulated concurrent writer flags.
    pub const RIVAL_STACK: StackId = StackId(999);

    pub fn new(inner: &'a FileStore) -> Self {
        Self {
            inner,
            relation_writes: Cell::new(0),
            journal_writes: Cell::new(0),
            stack_writes: Cell::new(0),
            fail_on: None,
            conflicts_left: Cell::new(0),
        }
    }

    /// Writes to `endpoint`'s relation fail with an I/O error.
    pub fn failing_on(mut self, endpoint: EndpointId) -> Self {
        self.fail_on = Some(endpoint);
        self
    }

    /// The next `n` relation writes race against another writer.
    pub fn with_conflicts(self, n: u32) -> Self {
        self.conflicts_left.set(n);
        self
    }

    pub fn relation_writes(&self) -> usize {
        self.relation_writes.get()
    }

    pub fn journal_writes(&self) -> usize {
        self.journal_writes.get()
    }

    pub fn stack_writes(&self) -> usize {
        self.stack_writes.get()
    }
}

impl DataStore for RecordingStore<'_> {
    fn stack(&self, id: StackId) -> Result<Stack, StoreError> {
        self.inner.stack(id)
    }

    fn update_stack_with<F>(&self, id: StackId, mutate: F) -> Result<Stack, StoreError>
    where
        F: FnOnce(&mut Stack),
    {
        self.stack_writes.set(self.stack_writes.get() + 1);
        self.inner.update_stack_with(id, mutate)
    }

    fn endpoint(&self, id: EndpointId) -> Result<Endpoint, StoreError> {
        self.inner.endpoint(id)
    }

    fn endpoint_relation(&self, id: EndpointId) -> Result<EndpointRelation, StoreError> {
        self.inner.endpoint_relation(id)
    }

    fn endpoint_relations(&self) -> Result<Vec<EndpointRelation>, StoreError> {
        self.inner.endpoint_relations()
    }

    fn update_endpoint_relation(
        &self,
        relation: &EndpointRelation,
    ) -> Result<EndpointRelation, StoreError> {
        self.relation_writes.set(self.relation_writes.get() + 1);
        if self.fail_on == Some(relation.endpoint_id) {
            return Err(StoreError::Io {
                path: PathBuf::from("relations"),
                source: std::io::Error::other("injected failure"),
            });
        }
        let conflicts = self.conflicts_left.get();
        if conflicts > 0 {
            self.conflicts_left.set(conflicts - 1);
            let mut rival = self.inner.endpoint_relation(relation.endpoint_id)?;
            rival.stacks.insert(Self::RIVAL_STACK, true);
            self.inner.update_endpoint_relation(&rival)?;
        }
        self.inner.update_endpoint_relation(relation)
    }

    fn relation_config(&self) -> Result<RelationConfig, StoreError> {
        self.inner.relation_config()
    }

    fn pending_sync(&self, stack: StackId) -> Result<Option<PendingSync>, StoreError> {
        self.inner.pending_sync(stack)
    }

    fn save_pending_sync(&self, pending: &PendingSync) -> Result<(), StoreError> {
        self.journal_writes.set(self.journal_writes.get() + 1);
        self.inner.save_pending_sync(pending)
    }

    fn clear_pending_sync(&self, stack: StackId) -> Result<(), StoreError> {
        self.inner.clear_pending_sync(stack)
    }
}
