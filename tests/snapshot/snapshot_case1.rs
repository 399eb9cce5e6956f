//! Case 1: a snapshot over three tablets completes
//!
//! Scenario:
//!
//! 1. Create a snapshot of tablets t1, t2 and t3 in term 1.
//! 2. Every worker answers CREATE_ON_TABLET with ok.
//!
//! Expected Result:
//!
//! - one CREATE_ON_TABLET per tablet
//! - `list_snapshots(nil)` returns exactly that snapshot, COMPLETE on every tablet
//! - the record survives a reload from the catalog store

use d_snapshot_coordinator::SnapshotCoordinator;
use d_snapshot_coordinator::SnapshotId;
use d_snapshot_coordinator::TabletOpType;
use d_snapshot_coordinator::TabletPhase;

use crate::common::config;
use crate::common::deadline;
use crate::common::tablets;
use crate::common::Cluster;
use crate::common::TestTypeConfig;
use crate::common::START;

#[tokio::test]
async fn test_snapshot_case1() {
    let cluster = Cluster::new(1);

    let snapshot_id = cluster
        .coordinator
        .create(tablets(&["t1", "t2", "t3"]), false, 1, deadline())
        .await
        .unwrap();
    cluster.wait_snapshot(snapshot_id, TabletPhase::Complete).await;

    let mut targets: Vec<_> = cluster
        .fleet
        .requests_of(TabletOpType::Create)
        .into_iter()
        .map(|(tablet_id, _)| tablet_id)
        .collect();
    targets.sort();
    assert_eq!(targets, vec!["t1", "t2", "t3"]);

    let snapshots = cluster.coordinator.list_snapshots(SnapshotId::nil(), false).unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].id, snapshot_id);
    assert_eq!(snapshots[0].snapshot_time, START);
    assert_eq!(snapshots[0].state, TabletPhase::Complete);
    assert!(snapshots[0].tablets.iter().all(|t| t.phase == TabletPhase::Complete));

    let reloaded = SnapshotCoordinator::<TestTypeConfig>::new(
        config(),
        cluster.replicator.clone(),
        cluster.fleet.clone(),
        cluster.catalog.clone(),
        cluster.clock.clone(),
    );
    reloaded.load().unwrap();
    assert_eq!(
        reloaded.list_snapshots(SnapshotId::nil(), false).unwrap(),
        snapshots
    );
}
