//! Rotation cycle integration tests

use reencrypt_controller::memory::{
    MemoryConfigPersister, MemoryKeyStore, MemoryNodeStore, MemorySecretStore, RecordingEventSink,
};
use reencrypt_controller::stage::{annotation_for, bootstrap_annotation, decode, Stage};
use reencrypt_controller::{plan, Decision, ReencryptController, RotationError};
use rekey_config::{ControllerConfig, RetryConfig, DEFAULT_ANNOTATION_KEY, DEFAULT_CONTROL_PLANE_LABEL};
use rekey_keys::KeyRecord;
use rekey_types::{EventKind, Node, Secret, REASON_PROGRESS, REASON_UPDATE_COMPLETE, REASON_UPDATE_ERROR};
use std::sync::Arc;

struct Cluster {
    nodes: Arc<MemoryNodeStore>,
    secrets: Arc<MemorySecretStore>,
    keys: Arc<MemoryKeyStore>,
    persister: Arc<MemoryConfigPersister>,
    events: Arc<RecordingEventSink>,
    controller: ReencryptController,
}

fn k0() -> KeyRecord {
    KeyRecord::new("aescbckey-2025-01", "dGhpcyBpcyB0aGUgYWN0aXZlIGtleQ==")
}

fn k1() -> KeyRecord {
    KeyRecord::new("aescbckey-2024-06", "dGhpcyBpcyB0aGUgb2xkIGtleQ==")
}

fn control_plane(name: &str) -> Node {
    Node::new(name).with_label(DEFAULT_CONTROL_PLANE_LABEL, "true")
}

fn cluster(skip: bool, keys: Vec<KeyRecord>, secret_count: usize) -> Cluster {
    rekey_logging::init_console_logging("reencrypt-tests", "debug");

    let nodes = Arc::new(MemoryNodeStore::new());
    let secrets = Arc::new(MemorySecretStore::new());
    for i in 0..secret_count {
        let namespace = ["default", "kube-system", "monitoring"][i % 3];
        secrets.insert(Secret::new(namespace, format!("secret-{i:03}")));
    }
    let keys = Arc::new(MemoryKeyStore::new(keys));
    let persister = Arc::new(MemoryConfigPersister::new());
    let events = Arc::new(RecordingEventSink::new());

    let config = ControllerConfig {
        skip,
        page_size: 4,
        retry: RetryConfig::new(5, 0, 0, 1.0),
        ..ControllerConfig::default()
    };
    let controller = ReencryptController::new(
        config,
        nodes.clone(),
        secrets.clone(),
        keys.clone(),
        persister.clone(),
        events.clone(),
    );

    Cluster {
        nodes,
        secrets,
        keys,
        persister,
        events,
        controller,
    }
}

fn annotation(cluster: &Cluster, name: &str) -> Option<String> {
    cluster
        .nodes
        .node(name)
        .and_then(|n| n.annotation(DEFAULT_ANNOTATION_KEY).map(str::to_string))
}

/// cp-1 requests a rotation of [k0, k1]; cp-2 idles at the start stage
fn request_rotation(cluster: &Cluster) -> Node {
    let keys = vec![k0(), k1()];
    cluster.nodes.insert(
        control_plane("cp-2").with_annotation(DEFAULT_ANNOTATION_KEY, bootstrap_annotation(&keys)),
    );
    cluster.nodes.insert(
        control_plane("cp-1")
            .with_annotation(DEFAULT_ANNOTATION_KEY, annotation_for(&keys, Stage::Request)),
    )
}

#[tokio::test]
async fn test_commit_path_retires_oldest_key() {
    let cluster = cluster(false, vec![k0(), k1()], 25);
    let node = request_rotation(&cluster);

    let latest = cluster.controller.on_change(Some(node)).await.unwrap().unwrap();

    let finished = annotation_for(&[k0()], Stage::Finished);
    assert_eq!(latest.annotation(DEFAULT_ANNOTATION_KEY), Some(finished.as_str()));
    assert_eq!(annotation(&cluster, "cp-1"), Some(finished));

    assert_eq!(cluster.keys.keys(), vec![k0()]);
    assert_eq!(cluster.keys.persisted(), Some(vec![k0()]));
    assert_eq!(cluster.persister.saves(), vec![true]);
    assert_eq!(cluster.secrets.write_count(), 25);

    let stages: Vec<Option<Stage>> = cluster
        .nodes
        .history("cp-1")
        .iter()
        .map(|n| decode(n.annotation(DEFAULT_ANNOTATION_KEY).unwrap()).unwrap().stage())
        .collect();
    assert_eq!(stages, vec![Some(Stage::Active), Some(Stage::Finished)]);

    let complete = cluster.events.with_reason(REASON_UPDATE_COMPLETE);
    assert_eq!(complete.len(), 1);
    assert_eq!(complete[0].message, "completed reencrypt of 25 secrets");
    assert_eq!(cluster.events.with_reason(REASON_PROGRESS).len(), 2);
    assert!(cluster.events.with_reason(REASON_UPDATE_ERROR).is_empty());

    // the idle peer is never touched
    assert!(cluster.nodes.history("cp-2").is_empty());
}

#[tokio::test]
async fn test_skip_path_reverts_to_start() {
    let cluster = cluster(true, vec![k0(), k1()], 3);
    let node = request_rotation(&cluster);

    cluster.controller.on_change(Some(node)).await.unwrap();

    assert_eq!(annotation(&cluster, "cp-1"), Some(bootstrap_annotation(&[k0(), k1()])));
    assert_eq!(cluster.keys.keys(), vec![k0(), k1()]);
    assert!(cluster.keys.persisted().is_none());
    assert!(cluster.persister.saves().is_empty());
    assert_eq!(cluster.secrets.write_count(), 3);

    let stages: Vec<Option<Stage>> = cluster
        .nodes
        .history("cp-1")
        .iter()
        .map(|n| decode(n.annotation(DEFAULT_ANNOTATION_KEY).unwrap()).unwrap().stage())
        .collect();
    assert_eq!(stages, vec![Some(Stage::Active), Some(Stage::Start)]);
}

#[tokio::test]
async fn test_conflict_exhaustion_leaves_node_unchanged() {
    let cluster = cluster(false, vec![k0(), k1()], 5);
    let node = request_rotation(&cluster);
    let before = annotation(&cluster, "cp-1");
    cluster.nodes.force_conflicts(5);

    let err = cluster.controller.on_change(Some(node)).await.unwrap_err();

    match err {
        RotationError::ConflictRetryExhausted { target, attempts } => {
            assert_eq!(target, "cp-1");
            assert_eq!(attempts, 5);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(cluster.nodes.update_attempts(), 5);
    assert_eq!(annotation(&cluster, "cp-1"), before);
    assert_eq!(cluster.secrets.write_count(), 0);
    assert_eq!(cluster.keys.keys(), vec![k0(), k1()]);

    let warnings = cluster.events.with_reason(REASON_UPDATE_ERROR);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, EventKind::Warning);
    assert_eq!(warnings[0].involved_object, "cp-1");
}

#[tokio::test]
async fn test_transient_conflicts_are_absorbed() {
    let cluster = cluster(false, vec![k0(), k1()], 2);
    let node = request_rotation(&cluster);
    cluster.nodes.force_conflicts(3);

    cluster.controller.on_change(Some(node)).await.unwrap();

    assert_eq!(annotation(&cluster, "cp-1"), Some(annotation_for(&[k0()], Stage::Finished)));
}

#[tokio::test]
async fn test_second_active_rotation_is_rejected() {
    let cluster = cluster(false, vec![k0(), k1()], 2);
    let node = request_rotation(&cluster);
    cluster.nodes.insert(
        control_plane("cp-2")
            .with_annotation(DEFAULT_ANNOTATION_KEY, annotation_for(&[k0(), k1()], Stage::Active)),
    );

    let err = cluster.controller.on_change(Some(node)).await.unwrap_err();

    assert!(matches!(err, RotationError::ConflictingActiveRotation { ref node } if node == "cp-2"));
    assert_eq!(
        annotation(&cluster, "cp-1"),
        Some(annotation_for(&[k0(), k1()], Stage::Request))
    );
    assert_eq!(cluster.secrets.write_count(), 0);
    assert_eq!(cluster.events.with_reason(REASON_UPDATE_ERROR).len(), 1);
}

#[tokio::test]
async fn test_active_workers_do_not_block_control_plane_rotation() {
    let cluster = cluster(false, vec![k0(), k1()], 3);
    let node = request_rotation(&cluster);
    let active = annotation_for(&[k0(), k1()], Stage::Active);
    cluster
        .nodes
        .insert(Node::new("worker-1").with_annotation(DEFAULT_ANNOTATION_KEY, active.clone()));
    cluster.nodes.insert(
        Node::new("cp-disabled")
            .with_label(DEFAULT_CONTROL_PLANE_LABEL, "false")
            .with_annotation(DEFAULT_ANNOTATION_KEY, active.clone()),
    );

    let latest = cluster.controller.on_change(Some(node)).await.unwrap().unwrap();

    let finished = annotation_for(&[k0()], Stage::Finished);
    assert_eq!(latest.annotation(DEFAULT_ANNOTATION_KEY), Some(finished.as_str()));
    assert_eq!(cluster.keys.persisted(), Some(vec![k0()]));
    assert_eq!(cluster.secrets.write_count(), 3);
    assert!(cluster.events.with_reason(REASON_UPDATE_ERROR).is_empty());
    // the non control-plane nodes are left as they were
    assert_eq!(annotation(&cluster, "worker-1"), Some(active.clone()));
    assert_eq!(annotation(&cluster, "cp-disabled"), Some(active));
}

#[tokio::test]
async fn test_stale_request_is_rejected() {
    let cluster = cluster(false, vec![k0(), k1()], 2);
    let node = cluster.nodes.insert(control_plane("cp-1").with_annotation(
        DEFAULT_ANNOTATION_KEY,
        annotation_for(&[k0(), k1(), KeyRecord::new("aescbckey-2023", "b2xkZXI=")], Stage::Request),
    ));

    let err = cluster.controller.on_change(Some(node)).await.unwrap_err();

    assert!(matches!(err, RotationError::StaleOrInvalidHash { .. }));
    assert!(cluster.nodes.history("cp-1").is_empty());
}

#[tokio::test]
async fn test_malformed_annotation_is_reported_without_mutation() {
    let cluster = cluster(false, vec![k0(), k1()], 2);
    let node = cluster.nodes.insert(
        control_plane("cp-1").with_annotation(DEFAULT_ANNOTATION_KEY, "reencrypt_request-abc-def"),
    );

    let err = cluster.controller.on_change(Some(node)).await.unwrap_err();

    assert!(matches!(err, RotationError::MalformedAnnotation { .. }));
    assert_eq!(cluster.nodes.update_attempts(), 0);
    assert_eq!(cluster.secrets.write_count(), 0);
    assert_eq!(cluster.events.with_reason(REASON_UPDATE_ERROR).len(), 1);
}

#[tokio::test]
async fn test_nodes_without_requests_are_ignored() {
    let cluster = cluster(false, vec![k0(), k1()], 2);
    let bare = cluster.nodes.insert(control_plane("cp-1"));
    let finished = cluster.nodes.insert(
        control_plane("cp-2")
            .with_annotation(DEFAULT_ANNOTATION_KEY, annotation_for(&[k0()], Stage::Finished)),
    );

    assert_eq!(cluster.controller.on_change(Some(bare.clone())).await.unwrap(), Some(bare));
    assert_eq!(
        cluster.controller.on_change(Some(finished.clone())).await.unwrap(),
        Some(finished)
    );
    assert_eq!(cluster.controller.on_change(None).await.unwrap(), None);

    assert_eq!(cluster.nodes.update_attempts(), 0);
    assert!(cluster.events.events().is_empty());
}

#[tokio::test]
async fn test_migration_failure_stops_the_cycle() {
    let cluster = cluster(false, vec![k0(), k1()], 10);
    let node = request_rotation(&cluster);
    cluster.secrets.fail_writes_after(4);

    let err = cluster.controller.on_change(Some(node)).await.unwrap_err();

    assert!(matches!(err, RotationError::MigrationFailure { .. }));
    // left active; no finish, no key change
    assert_eq!(
        annotation(&cluster, "cp-1"),
        Some(annotation_for(&[k0(), k1()], Stage::Active))
    );
    assert_eq!(cluster.keys.keys(), vec![k0(), k1()]);
    assert!(cluster.events.with_reason(REASON_UPDATE_COMPLETE).is_empty());
    assert_eq!(cluster.events.with_reason(REASON_UPDATE_ERROR).len(), 1);
}

#[tokio::test]
async fn test_snapshot_failure_is_a_persistence_failure() {
    let cluster = cluster(false, vec![k0(), k1()], 1);
    let node = request_rotation(&cluster);
    cluster.persister.fail_with("datastore unavailable");

    let err = cluster.controller.on_change(Some(node)).await.unwrap_err();

    assert!(matches!(err, RotationError::PersistenceFailure(ref msg) if msg.contains("datastore unavailable")));
    assert_eq!(cluster.keys.persisted(), Some(vec![k0()]));
}

#[tokio::test]
async fn test_only_key_is_never_retired() {
    let cluster = cluster(false, vec![k0()], 1);
    let node = cluster.nodes.insert(
        control_plane("cp-1").with_annotation(DEFAULT_ANNOTATION_KEY, annotation_for(&[k0()], Stage::Request)),
    );

    let err = cluster.controller.on_change(Some(node)).await.unwrap_err();

    assert!(matches!(err, RotationError::PersistenceFailure(_)));
    assert_eq!(cluster.keys.keys(), vec![k0()]);
    assert!(cluster.keys.persisted().is_none());
}

#[tokio::test]
async fn test_cancellation_aborts_migration() {
    let cluster = cluster(false, vec![k0(), k1()], 8);
    let node = request_rotation(&cluster);
    cluster.controller.cancellation_token().cancel();

    let err = cluster.controller.on_change(Some(node)).await.unwrap_err();

    assert!(matches!(err, RotationError::Cancelled));
    assert_eq!(cluster.secrets.write_count(), 0);
    assert_eq!(cluster.keys.keys(), vec![k0(), k1()]);
}

#[tokio::test]
async fn test_request_issued_before_a_completed_rotation_goes_stale() {
    let cluster = cluster(false, vec![k0(), k1()], 2);
    let first = request_rotation(&cluster);
    let second = cluster.nodes.insert(
        control_plane("cp-2")
            .with_annotation(DEFAULT_ANNOTATION_KEY, annotation_for(&[k0(), k1()], Stage::Request)),
    );

    // both requests validate against the same snapshot of the cluster
    let peers = vec![first.clone(), second.clone()];
    for node in [&first, &second] {
        assert!(matches!(
            plan(node, DEFAULT_ANNOTATION_KEY, &[k0(), k1()], &peers).unwrap(),
            Decision::Rotate { .. }
        ));
    }

    cluster.controller.on_change(Some(first)).await.unwrap();
    let err = cluster.controller.on_change(Some(second)).await.unwrap_err();

    assert!(matches!(err, RotationError::StaleOrInvalidHash { .. }));
    assert_eq!(cluster.keys.keys(), vec![k0()]);
}

#[tokio::test]
async fn test_redelivered_finished_node_is_a_no_op() {
    let cluster = cluster(false, vec![k0(), k1()], 2);
    let node = request_rotation(&cluster);

    let latest = cluster.controller.on_change(Some(node)).await.unwrap();
    let attempts = cluster.nodes.update_attempts();
    cluster.controller.on_change(latest).await.unwrap();

    assert_eq!(cluster.nodes.update_attempts(), attempts);
    assert_eq!(cluster.keys.keys(), vec![k0()]);
    assert_eq!(cluster.persister.saves().len(), 1);
}
