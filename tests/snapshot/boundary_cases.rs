use d_snapshot_coordinator::ErrorKind;
use d_snapshot_coordinator::HybridTime;
use d_snapshot_coordinator::TabletOpType;
use d_snapshot_coordinator::TabletPhase;
use tonic::Status;

use crate::common::deadline;
use crate::common::tablets;
use crate::common::Cluster;

#[tokio::test]
async fn test_create_without_tablets_is_illegal() {
    let cluster = Cluster::new(1);

    let err = cluster
        .coordinator
        .create(Vec::new(), false, 1, deadline())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert!(cluster.replicator.log().is_empty());
}

#[tokio::test]
async fn test_delete_of_creating_or_deleted_snapshot_is_illegal() {
    let cluster = Cluster::new(1);
    cluster
        .fleet
        .fail_next("t1", TabletOpType::Create, Status::unavailable("no leader"));
    let snapshot_id = cluster
        .coordinator
        .create(tablets(&["t1"]), false, 1, deadline())
        .await
        .unwrap();
    crate::common::settle().await;
    assert_eq!(cluster.snapshot(snapshot_id).state, TabletPhase::Creating);

    let err = cluster.coordinator.delete(snapshot_id, 1, deadline()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);

    cluster.tick().await;
    cluster.wait_snapshot(snapshot_id, TabletPhase::Complete).await;
    cluster.coordinator.delete(snapshot_id, 1, deadline()).await.unwrap();
    cluster.wait_snapshot(snapshot_id, TabletPhase::Deleted).await;

    let err = cluster.coordinator.delete(snapshot_id, 1, deadline()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
}

#[tokio::test]
async fn test_restore_of_incomplete_snapshot_is_not_ready() {
    let cluster = Cluster::new(1);
    cluster
        .fleet
        .fail_with("t2", TabletOpType::Create, Status::aborted("disk full"));
    let failed = cluster
        .coordinator
        .create(tablets(&["t1", "t2"]), false, 1, deadline())
        .await
        .unwrap();
    cluster.wait_snapshot(failed, TabletPhase::Failed).await;

    let err = cluster
        .coordinator
        .restore(failed, HybridTime::MIN, 1)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SnapshotNotReady);
}
