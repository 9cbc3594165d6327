use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use fleetstack_core::{
    paths, DataStore, DeploymentType, EdgeGroup, EdgeGroupId, Endpoint, EndpointGroup,
    EndpointGroupId, EndpointId, EndpointStatus, FileStore, Membership, Platform,
    RelationConfig, Stack, StackId, StatusKind, TagId,
};
use fleetstack_sync::{
    ComposeConverter, LocalStorage, Phase, RelationSynchronizer, StackUpdater, UpdateError,
    UpdateStackRequest,
};
use tempfile::TempDir;

const STACK: StackId = StackId(7);
const GROUP_A: EdgeGroupId = EdgeGroupId(1);
const GROUP_B: EdgeGroupId = EdgeGroupId(2);
const GROUP_K8S: EdgeGroupId = EdgeGroupId(3);
const GROUP_TAGGED: EdgeGroupId = EdgeGroupId(4);

const COMPOSE: &str = "services:\n  web:\n    image: nginx:1.25\n    ports:\n      - \"8080:80\"\n";

struct Env {
    home: TempDir,
    store: FileStore,
    storage: LocalStorage,
}

impl Env {
    fn stack_dir(&self) -> PathBuf {
        paths::edge_stacks_root(self.home.path()).join(STACK.folder_key())
    }

    fn flags(&self) -> BTreeSet<u32> {
        self.store
            .endpoint_relations()
            .expect("relations")
            .into_iter()
            .filter(|r| r.targets(STACK))
            .map(|r| r.endpoint_id.0)
            .collect()
    }

    fn update(&self, request: UpdateStackRequest) -> Result<Stack, UpdateError> {
        StackUpdater::new(&self.store, &self.storage, &ComposeConverter).update(request)
    }
}

fn endpoint(id: u32, platform: Platform, tags: &[u32]) -> Endpoint {
    Endpoint {
        id: EndpointId(id),
        name: format!("edge-{id}"),
        platform,
        group_id: EndpointGroupId(1),
        tag_ids: tags.iter().copied().map(TagId).collect(),
    }
}

/// Docker endpoints 1–3, Kubernetes endpoints 4–5.
/// A = {1,2,3}, B = {3,4}, K8S = {4,5}, TAGGED = endpoints tagged 10.
fn env() -> Env {
    let home = TempDir::new().expect("home");
    let store = FileStore::open_at(home.path()).expect("open store");
    let static_group = |id: EdgeGroupId, name: &str, members: &[u32]| EdgeGroup {
        id,
        name: name.to_string(),
        membership: Membership::Static {
            endpoints: members.iter().copied().map(EndpointId).collect(),
        },
    };
    store
        .save_fleet(&RelationConfig {
            endpoints: vec![
                endpoint(1, Platform::Docker, &[10]),
                endpoint(2, Platform::Docker, &[]),
                endpoint(3, Platform::Docker, &[]),
                endpoint(4, Platform::Kubernetes, &[10]),
                endpoint(5, Platform::Kubernetes, &[]),
            ],
            endpoint_groups: vec![EndpointGroup {
                id: EndpointGroupId(1),
                name: "unassigned".to_string(),
                tag_ids: vec![],
            }],
            edge_groups: vec![
                static_group(GROUP_A, "A", &[1, 2, 3]),
                static_group(GROUP_B, "B", &[3, 4]),
                static_group(GROUP_K8S, "K8S", &[4, 5]),
                EdgeGroup {
                    id: GROUP_TAGGED,
                    name: "tagged".to_string(),
                    membership: Membership::Dynamic {
                        tag_ids: vec![TagId(10)],
                        partial_match: false,
                    },
                },
            ],
        })
        .expect("save fleet");
    for id in 1..=5 {
        store.register_endpoint(EndpointId(id)).expect("register");
    }

    let storage = LocalStorage::new(paths::edge_stacks_root(home.path()));
    let env = Env {
        home,
        store,
        storage,
    };
    let stack = Stack::new(STACK, "web", env.stack_dir());
    env.store.save_stack(&stack).expect("save stack");
    env
}

fn request(groups: Option<Vec<EdgeGroupId>>, deployment_type: DeploymentType) -> UpdateStackRequest {
    UpdateStackRequest {
        stack_id: STACK,
        content: COMPOSE.as_bytes().to_vec(),
        edge_groups: groups,
        deployment_type,
        bump_version: false,
        use_manifest_namespaces: false,
    }
}

fn set(ids: &[u32]) -> BTreeSet<u32> {
    ids.iter().copied().collect()
}

#[test]
fn moving_between_groups_rewrites_only_the_difference() {
    let env = env();
    env.update(request(Some(vec![GROUP_A]), DeploymentType::Compose))
        .expect("initial update");
    assert_eq!(env.flags(), set(&[1, 2, 3]));
    let endpoint_3 = env.store.endpoint_relation(EndpointId(3)).expect("relation 3");

    let stack = env
        .update(request(Some(vec![GROUP_B]), DeploymentType::Compose))
        .expect("update to B");

    assert_eq!(env.flags(), set(&[3, 4]));
    assert_eq!(
        env.store.endpoint_relation(EndpointId(3)).expect("relation 3"),
        endpoint_3,
        "endpoint 3 is in both sets and must not be rewritten"
    );
    assert_eq!(stack.edge_groups, vec![GROUP_B]);
    assert_eq!(stack.num_deployments, 2);
    assert_eq!(stack, env.store.stack(STACK).expect("reload"));
}

#[test]
fn compose_stack_with_kubernetes_members_gets_a_manifest() {
    let env = env();
    let stack = env
        .update(request(Some(vec![GROUP_B]), DeploymentType::Compose))
        .expect("update");

    assert_eq!(stack.entry_point, "docker-compose.yml");
    assert_eq!(stack.manifest_path, "k8s-deployment.yml");
    let manifest = fs::read_to_string(env.stack_dir().join("k8s-deployment.yml")).expect("manifest");
    assert!(manifest.contains("kind: Deployment"));
    assert!(manifest.contains("kind: Service"));

    let stack = env
        .update(request(Some(vec![GROUP_A]), DeploymentType::Compose))
        .expect("docker-only update");
    assert_eq!(stack.manifest_path, "", "unused manifest path is cleared");
}

#[test]
fn kubernetes_stack_aimed_at_docker_endpoints_changes_nothing() {
    let env = env();
    env.update(request(Some(vec![GROUP_A]), DeploymentType::Compose))
        .expect("initial update");
    let before_stack = env.store.stack(STACK).expect("stack");
    let before_relations = env.store.endpoint_relations().expect("relations");
    let compose = fs::read_to_string(env.stack_dir().join("docker-compose.yml")).expect("compose");

    let err = env
        .update(request(Some(vec![GROUP_B]), DeploymentType::Kubernetes))
        .unwrap_err();

    match &err {
        UpdateError::TypeConflict { endpoints, .. } => assert_eq!(endpoints, &vec![EndpointId(3)]),
        other => panic!("expected type conflict, got {other:?}"),
    }
    assert_eq!(err.phase(), Phase::Artifact);
    assert_eq!(env.store.stack(STACK).expect("stack"), before_stack);
    assert_eq!(env.store.endpoint_relations().expect("relations"), before_relations);
    assert_eq!(
        fs::read_to_string(env.stack_dir().join("docker-compose.yml")).expect("compose"),
        compose
    );
}

#[test]
fn switching_to_kubernetes_purges_compose_files() {
    let env = env();
    env.update(request(Some(vec![GROUP_K8S]), DeploymentType::Compose))
        .expect("compose update");
    assert!(env.stack_dir().join("docker-compose.yml").exists());

    let mut req = request(None, DeploymentType::Kubernetes);
    req.content = b"apiVersion: v1\nkind: Namespace\nmetadata:\n  name: web\n".to_vec();
    let stack = env.update(req).expect("switch");

    assert_eq!(stack.deployment_type, DeploymentType::Kubernetes);
    assert_eq!(stack.entry_point, "");
    assert_eq!(stack.manifest_path, "k8s-deployment.yml");
    assert!(!env.stack_dir().join("docker-compose.yml").exists());
    let manifest = fs::read_to_string(env.stack_dir().join("k8s-deployment.yml")).expect("manifest");
    assert!(manifest.contains("kind: Namespace"));
}

#[test]
fn version_bump_resets_endpoint_status() {
    let env = env();
    env.store
        .update_stack_with(STACK, |s| {
            s.status.insert(
                EndpointId(1),
                EndpointStatus {
                    kind: StatusKind::Deployed,
                    message: None,
                },
            );
        })
        .expect("seed status");

    let unbumped = env
        .update(request(Some(vec![GROUP_A]), DeploymentType::Compose))
        .expect("plain update");
    assert_eq!(unbumped.version, 1);
    assert_eq!(unbumped.status.len(), 1);

    let mut req = request(None, DeploymentType::Compose);
    req.bump_version = true;
    req.use_manifest_namespaces = true;
    let bumped = env.update(req).expect("bumped update");
    assert_eq!(bumped.version, 2);
    assert!(bumped.status.is_empty());
    assert!(bumped.use_manifest_namespaces);
}

#[test]
fn dynamic_group_follows_tags() {
    let env = env();
    let stack = env
        .update(request(Some(vec![GROUP_TAGGED]), DeploymentType::Compose))
        .expect("update");
    assert_eq!(env.flags(), set(&[1, 4]));
    assert_eq!(stack.num_deployments, 2);
}

#[test]
fn invalid_requests_persist_nothing() {
    let env = env();
    let before = env.store.stack(STACK).expect("stack");

    let err = env
        .update(request(Some(vec![]), DeploymentType::Compose))
        .unwrap_err();
    assert_eq!(err.phase(), Phase::Validation);

    let mut blank = request(Some(vec![GROUP_A]), DeploymentType::Compose);
    blank.content.clear();
    assert!(matches!(env.update(blank), Err(UpdateError::Validation(_))));

    assert_eq!(env.store.stack(STACK).expect("stack"), before);
    assert!(env.flags().is_empty());
    assert!(!env.stack_dir().exists());
}

#[test]
fn reconcile_restores_relations_after_manual_drift() {
    let env = env();
    env.update(request(Some(vec![GROUP_B]), DeploymentType::Compose))
        .expect("update");

    // Endpoint 4 loses its flag and endpoint 1 gains a stray one.
    let mut relation = env.store.endpoint_relation(EndpointId(4)).expect("relation 4");
    relation.stacks.remove(&STACK);
    env.store.update_endpoint_relation(&relation).expect("drop flag");
    let mut relation = env.store.endpoint_relation(EndpointId(1)).expect("relation 1");
    relation.stacks.insert(STACK, true);
    env.store.update_endpoint_relation(&relation).expect("stray flag");

    let diff = RelationSynchronizer::new(&env.store)
        .reconcile(STACK)
        .expect("reconcile");

    assert_eq!(diff.added.len(), 1);
    assert_eq!(diff.removed.len(), 1);
    assert_eq!(env.flags(), set(&[3, 4]));
    assert!(env.store.pending_sync(STACK).expect("journal").is_none());
}

#[test]
fn update_after_interrupted_move_converges_on_new_groups() {
    let env = env();
    env.update(request(Some(vec![GROUP_A]), DeploymentType::Compose))
        .expect("join A");
    assert_eq!(env.flags(), set(&[1, 2, 3]));

    fs::remove_file(paths::relation_path(env.home.path(), EndpointId(5)))
        .expect("drop relation 5");
    let err = env
        .update(request(Some(vec![GROUP_K8S]), DeploymentType::Compose))
        .unwrap_err();
    assert!(matches!(err, UpdateError::Relations(_)));
    assert!(env.store.pending_sync(STACK).expect("journal").is_some());

    env.store.register_endpoint(EndpointId(5)).expect("re-register");
    let stack = env
        .update(request(Some(vec![GROUP_B]), DeploymentType::Compose))
        .expect("move to B");

    assert_eq!(stack.edge_groups, vec![GROUP_B]);
    assert_eq!(stack.num_deployments, 2);
    assert_eq!(env.flags(), set(&[3, 4]));
    assert!(env.store.pending_sync(STACK).expect("journal").is_none());
}

#[test]
fn unconvertible_compose_keeps_relations_on_old_groups() {
    let env = env();
    env.update(request(Some(vec![GROUP_A]), DeploymentType::Compose))
        .expect("join A");

    let mut bad = request(Some(vec![GROUP_B]), DeploymentType::Compose);
    bad.content = b"services:\n  api:\n    build: .\n".to_vec();
    let err = env.update(bad).unwrap_err();

    assert_eq!(err.phase(), Phase::Artifact);
    assert_eq!(env.store.stack(STACK).expect("stack").edge_groups, vec![GROUP_A]);
    assert_eq!(env.flags(), set(&[1, 2, 3]));
    assert!(env.store.pending_sync(STACK).expect("journal").is_none());
}
