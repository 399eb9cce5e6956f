//! Case 1: the leader term changes while a schedule snapshot is in flight
//!
//! Scenario:
//!
//! 1. Create a snapshot for a schedule in term 1.
//! 2. The term moves to 2 before the workers' replies are handled.
//! 3. Tick in term 2.
//!
//! Expected Result:
//!
//! - replies sent in term 1 leave the snapshot CREATING
//! - the tick in term 2 resends every CREATE and the snapshot completes
//! - a follower replaying the log sees the snapshot COMPLETE
//! - the schedule accepts its next snapshot

use std::time::Duration;

use d_snapshot_coordinator::HybridTime;
use d_snapshot_coordinator::TabletOpType;
use d_snapshot_coordinator::TabletPhase;

use crate::common::deadline;
use crate::common::namespace_schedule;
use crate::common::settle;
use crate::common::table;
use crate::common::Cluster;

#[tokio::test]
async fn test_leader_change_case1() {
    let cluster = Cluster::new(1);
    cluster
        .catalog
        .add_table(table("tb1", "db", "orders"), &["t1", "t2"], HybridTime::from_secs(1));
    let schedule_id = cluster
        .coordinator
        .create_schedule(
            namespace_schedule("db", Duration::from_secs(60), Duration::from_secs(600)),
            1,
            deadline(),
        )
        .await
        .unwrap();

    let snapshot_id = cluster
        .coordinator
        .create_for_schedule(schedule_id, 1, deadline())
        .await
        .unwrap();
    cluster.replicator.set_leader_term(2);
    settle().await;
    assert_eq!(cluster.snapshot(snapshot_id).state, TabletPhase::Creating);
    assert_eq!(cluster.fleet.requests_of(TabletOpType::Create).len(), 2);

    cluster.tick().await;

    cluster.wait_snapshot(snapshot_id, TabletPhase::Complete).await;
    assert_eq!(cluster.fleet.requests_of(TabletOpType::Create).len(), 4);
    settle().await;
    let follower = cluster.follower();
    cluster.replicator.replay_into(&follower).unwrap();
    assert_eq!(
        follower.list_snapshots(snapshot_id, true).unwrap()[0].state,
        TabletPhase::Complete
    );

    cluster.clock.advance(Duration::from_secs(1));
    let next = cluster
        .coordinator
        .create_for_schedule(schedule_id, 2, deadline())
        .await
        .unwrap();
    cluster.wait_snapshot(next, TabletPhase::Complete).await;
    assert_eq!(cluster.schedule(schedule_id).snapshots.len(), 2);
}
