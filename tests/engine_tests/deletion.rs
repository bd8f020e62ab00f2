//! Integration tests for cluster deletion
//!
//! These tests tell the story of how the finalizer holds a deleted
//! OpenSearchCluster until every teardown unit has finished, and how the object
//! is released afterwards.

use std::time::Duration;

use opensearch_operator::components::{ComponentKind, PipelineMode};
use opensearch_operator::crd::ClusterPhase;
use opensearch_operator::events::reasons;
use opensearch_operator::requeue::ReconcileResult;
use opensearch_operator::Error;

use super::support::{adopted_cluster, finalizers, mark_deleting, new_cluster, Harness, Outcome};

const TEARDOWN_ORDER: [ComponentKind; 5] = [
    ComponentKind::Tls,
    ComponentKind::SecurityConfig,
    ComponentKind::Configuration,
    ComponentKind::Cluster,
    ComponentKind::Dashboards,
];

/// Story: TLS teardown is still waiting on something. The engine returns the
/// unit's exact request and keeps the finalizer so the object stays around.
#[tokio::test]
async fn story_waiting_teardown_keeps_the_finalizer() {
    let h = Harness::new();
    let key = h
        .store
        .insert(mark_deleting(adopted_cluster("logs", ClusterPhase::Running)));
    h.script.set(
        ComponentKind::Tls,
        PipelineMode::Teardown,
        Outcome::Requeue(ReconcileResult::requeue()),
    );

    let result = h.reconcile(&key).await.expect("teardown pass should succeed");

    assert_eq!(
        result,
        ReconcileResult {
            requeue: true,
            requeue_after: None,
        }
    );
    assert_eq!(finalizers(&h.store, &key), vec!["Opster"]);
    assert_eq!(h.script.calls_in(PipelineMode::Teardown), vec![ComponentKind::Tls]);
    assert!(h.script.calls_in(PipelineMode::Apply).is_empty());
}

/// Story: a clean teardown runs the five deleting units in order, then the
/// finalizer is removed and the store purges the object
#[tokio::test]
async fn story_clean_teardown_releases_the_object() {
    let h = Harness::new();
    let key = h
        .store
        .insert(mark_deleting(adopted_cluster("logs", ClusterPhase::Running)));

    let result = h.reconcile(&key).await.expect("teardown pass should succeed");

    assert_eq!(result, ReconcileResult::done());
    assert_eq!(h.script.calls_in(PipelineMode::Teardown), TEARDOWN_ORDER.to_vec());
    assert!(h.store.current(&key).is_none());
    assert_eq!(
        h.events.reasons(),
        vec![
            reasons::DELETION_STARTED.to_string(),
            reasons::RESOURCES_DELETED.to_string(),
        ]
    );
}

/// Story: the cluster unit cannot delete its StatefulSets yet. The error is
/// returned as is, dashboards teardown is skipped and the finalizer stays.
#[tokio::test]
async fn story_failed_teardown_keeps_the_finalizer() {
    let h = Harness::new();
    let key = h
        .store
        .insert(mark_deleting(adopted_cluster("logs", ClusterPhase::Running)));
    h.script.set(
        ComponentKind::Cluster,
        PipelineMode::Teardown,
        Outcome::Fail("statefulset still terminating"),
    );

    let err = h.reconcile(&key).await.expect_err("teardown failure should propagate");

    assert!(matches!(err, Error::Component { ref component, .. } if component == "cluster"));
    assert_eq!(h.script.calls_in(PipelineMode::Teardown), TEARDOWN_ORDER[..4].to_vec());
    assert_eq!(finalizers(&h.store, &key), vec!["Opster"]);
}

/// Story: teardown needs several passes. The finalizer is only removed on
/// the first pass where every unit converged.
#[tokio::test]
async fn story_finalizer_removed_only_after_a_clean_pass() {
    let h = Harness::new();
    let key = h
        .store
        .insert(mark_deleting(adopted_cluster("logs", ClusterPhase::Running)));
    let wait = ReconcileResult::requeue_after(Duration::from_secs(5));
    h.script
        .set(ComponentKind::Dashboards, PipelineMode::Teardown, Outcome::Requeue(wait));

    assert_eq!(h.reconcile(&key).await.expect("pass should succeed"), wait);
    assert_eq!(finalizers(&h.store, &key), vec!["Opster"]);

    h.script
        .set(ComponentKind::Dashboards, PipelineMode::Teardown, Outcome::Done);
    h.script.clear_calls();

    assert_eq!(
        h.reconcile(&key).await.expect("pass should succeed"),
        ReconcileResult::done()
    );
    assert_eq!(h.script.calls_in(PipelineMode::Teardown), TEARDOWN_ORDER.to_vec());
    assert!(h.store.current(&key).is_none());
}

/// Story: another controller still holds its own finalizer. Ours is removed,
/// theirs is kept and the object stays until they are done.
#[tokio::test]
async fn story_foreign_finalizer_outlives_ours() {
    let h = Harness::new();
    let mut cluster = mark_deleting(adopted_cluster("logs", ClusterPhase::Running));
    cluster.metadata.finalizers = Some(vec![
        "backup.example.com/protect".to_string(),
        "Opster".to_string(),
    ]);
    let key = h.store.insert(cluster);

    let result = h.reconcile(&key).await.expect("teardown pass should succeed");

    assert_eq!(result, ReconcileResult::done());
    assert_eq!(finalizers(&h.store, &key), vec!["backup.example.com/protect"]);
}

/// Story: a deleting object without our finalizer is none of our business
#[tokio::test]
async fn story_deleting_without_finalizer_is_left_alone() {
    let h = Harness::new();
    let mut cluster = mark_deleting(adopted_cluster("logs", ClusterPhase::Running));
    cluster.metadata.finalizers = Some(vec!["backup.example.com/protect".to_string()]);
    let key = h.store.insert(cluster);

    let result = h.reconcile(&key).await.expect("pass should succeed");

    assert_eq!(result, ReconcileResult::done());
    assert!(h.script.calls().is_empty());
    assert_eq!(h.store.writes(), 0);
    assert_eq!(finalizers(&h.store, &key), vec!["backup.example.com/protect"]);
}

/// Story: the user deletes a brand-new cluster while the engine is adopting
/// it. The finalizer is not added and no apply unit runs, so nothing is
/// created that would later need tearing down.
#[tokio::test]
async fn story_deletion_during_adoption_stops_the_pass() {
    let h = Harness::new();
    let mut cluster = new_cluster("logs");
    cluster.metadata.finalizers = Some(vec!["backup.example.com/protect".to_string()]);
    let key = h.store.insert(cluster);
    h.store.delete_after_next_get();

    let result = h.reconcile(&key).await.expect("pass should succeed");

    assert_eq!(result, ReconcileResult::done());
    assert!(h.script.calls().is_empty());
    assert_eq!(h.store.writes(), 0);
    assert_eq!(h.readiness.probes(), 0);
    let stored = h.store.current(&key).expect("foreign finalizer holds the object");
    assert!(stored.is_deleting());
    assert_eq!(stored.phase(), None);
    assert_eq!(finalizers(&h.store, &key), vec!["backup.example.com/protect"]);
}

/// Story: a teardown unit keeps waiting across several passes. The teardown
/// is announced once, and the release is announced when it finally completes.
#[tokio::test]
async fn story_teardown_is_announced_once() {
    let h = Harness::new();
    let key = h
        .store
        .insert(mark_deleting(adopted_cluster("logs", ClusterPhase::Running)));
    h.script.set(
        ComponentKind::Configuration,
        PipelineMode::Teardown,
        Outcome::Requeue(ReconcileResult::requeue()),
    );

    for _ in 0..3 {
        h.reconcile(&key).await.expect("pass should succeed");
    }
    h.script
        .set(ComponentKind::Configuration, PipelineMode::Teardown, Outcome::Done);
    h.reconcile(&key).await.expect("pass should succeed");

    assert_eq!(
        h.events.reasons(),
        vec![
            reasons::DELETION_STARTED.to_string(),
            reasons::RESOURCES_DELETED.to_string(),
        ]
    );
    assert!(h.store.current(&key).is_none());
}
