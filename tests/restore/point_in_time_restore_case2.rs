//! Case 2: leadership changes before the restored catalog loads
//!
//! Scenario:
//!
//! 1. Leader at term 7 starts a point in time restore.
//! 2. The catalog is reported loaded at term 8.
//!
//! Expected Result:
//!
//! - the postponed restoration is dropped
//! - no RESTORE_ON_TABLET is ever sent

use std::time::Duration;

use d_snapshot_coordinator::HybridTime;
use d_snapshot_coordinator::RestorationId;
use d_snapshot_coordinator::TabletOpType;
use d_snapshot_coordinator::TabletPhase;

use crate::common::deadline;
use crate::common::namespace_schedule;
use crate::common::settle;
use crate::common::table;
use crate::common::Cluster;
use crate::common::START;

#[tokio::test]
async fn test_point_in_time_restore_case2() {
    let cluster = Cluster::new(7);
    cluster
        .catalog
        .add_table(table("tb1", "db", "orders"), &["t1", "t2"], HybridTime::from_secs(1));
    let schedule_id = cluster
        .coordinator
        .create_schedule(
            namespace_schedule("db", Duration::from_secs(60), Duration::from_secs(600)),
            7,
            deadline(),
        )
        .await
        .unwrap();
    let snapshot_id = cluster
        .coordinator
        .create_for_schedule(schedule_id, 7, deadline())
        .await
        .unwrap();
    cluster.wait_snapshot(snapshot_id, TabletPhase::Complete).await;

    let restoration_id = cluster
        .coordinator
        .restore(snapshot_id, START, 7)
        .await
        .unwrap();
    cluster.replicator.set_leader_term(8);
    cluster.coordinator.sys_catalog_loaded(8);
    settle().await;

    assert_eq!(cluster.coordinator.postponed_restores_len(), 0);
    let restoration = cluster
        .coordinator
        .list_restorations(restoration_id, snapshot_id)
        .unwrap()
        .remove(0);
    assert_eq!(restoration.state, TabletPhase::Failed);
    assert!(cluster.fleet.requests_of(TabletOpType::Restore).is_empty());

    // Later ticks of the new term do not resurrect it.
    cluster.tick().await;
    assert!(cluster.fleet.requests_of(TabletOpType::Restore).is_empty());
    assert_eq!(
        cluster
            .coordinator
            .list_restorations(RestorationId::nil(), snapshot_id)
            .unwrap()
            .len(),
        1
    );
}
