//! Case 1: a terminal tablet failure fails the snapshot, which can still be deleted
//!
//! Scenario:
//!
//! 1. Create a snapshot of t1 and t2; the worker of t2 aborts.
//! 2. Delete the failed snapshot.
//! 3. Tick past the cleanup delay.
//!
//! Expected Result:
//!
//! - the snapshot aggregates to FAILED
//! - both tablets get DELETE_ON_TABLET and the snapshot reaches DELETED
//! - the record is tombstoned once `cleanup_delay` passed

use std::time::Duration;

use d_snapshot_coordinator::EntityType;
use d_snapshot_coordinator::SnapshotId;
use d_snapshot_coordinator::TabletOpType;
use d_snapshot_coordinator::TabletPhase;
use tonic::Status;

use crate::common::config;
use crate::common::deadline;
use crate::common::tablets;
use crate::common::Cluster;

#[tokio::test]
async fn test_failed_snapshot_case1() {
    let mut config = config();
    config.cleanup_delay_ms = 5_000;
    let cluster = Cluster::with_config(1, config);
    cluster
        .fleet
        .fail_with("t2", TabletOpType::Create, Status::aborted("tablet is being split"));

    let snapshot_id = cluster
        .coordinator
        .create(tablets(&["t1", "t2"]), false, 1, deadline())
        .await
        .unwrap();
    cluster.wait_snapshot(snapshot_id, TabletPhase::Failed).await;
    let failed = cluster.snapshot(snapshot_id);
    assert!(failed.tablets.iter().any(|t| t.phase == TabletPhase::Complete));
    assert!(failed.tablets.iter().any(|t| t.phase == TabletPhase::Failed));

    cluster.coordinator.delete(snapshot_id, 1, deadline()).await.unwrap();
    cluster.wait_snapshot(snapshot_id, TabletPhase::Deleted).await;
    let mut deleted: Vec<_> = cluster
        .fleet
        .requests_of(TabletOpType::Delete)
        .into_iter()
        .map(|(tablet_id, _)| tablet_id)
        .collect();
    deleted.sort();
    assert_eq!(deleted, vec!["t1", "t2"]);

    cluster.set_time(Duration::from_secs(4));
    cluster.tick().await;
    assert_eq!(cluster.catalog.record_count(EntityType::Snapshot), 1);

    cluster.set_time(Duration::from_secs(5));
    cluster.tick().await;
    assert_eq!(cluster.catalog.record_count(EntityType::Snapshot), 0);
    assert!(cluster
        .coordinator
        .list_snapshots(SnapshotId::nil(), true)
        .unwrap()
        .is_empty());
}
