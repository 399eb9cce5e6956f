//! Case 1: a follower replaying the log converges with the leader
//!
//! Scenario:
//!
//! 1. The leader creates a standalone snapshot, a schedule with two
//!    snapshots, and deletes the standalone snapshot.
//! 2. A fresh follower replays the committed log.
//!
//! Expected Result:
//!
//! - the follower lists the same snapshots and schedules as the leader
//! - the follower never talks to a tablet

use std::time::Duration;

use d_snapshot_coordinator::HybridTime;
use d_snapshot_coordinator::ScheduleId;
use d_snapshot_coordinator::SnapshotId;
use d_snapshot_coordinator::TabletPhase;

use crate::common::deadline;
use crate::common::namespace_schedule;
use crate::common::settle;
use crate::common::table;
use crate::common::tablets;
use crate::common::Cluster;

#[tokio::test]
async fn test_follower_replay_case1() {
    let cluster = Cluster::new(1);
    cluster
        .catalog
        .add_table(table("tb1", "db", "orders"), &["t1", "t2"], HybridTime::from_secs(1));

    let standalone = cluster
        .coordinator
        .create(tablets(&["t5", "t6"]), false, 1, deadline())
        .await
        .unwrap();
    cluster.wait_snapshot(standalone, TabletPhase::Complete).await;

    let schedule_id = cluster
        .coordinator
        .create_schedule(
            namespace_schedule("db", Duration::from_secs(1), Duration::from_secs(60)),
            1,
            deadline(),
        )
        .await
        .unwrap();
    cluster.tick().await;
    cluster.set_time(Duration::from_secs(1));
    cluster.tick().await;
    assert_eq!(cluster.schedule(schedule_id).snapshots.len(), 2);

    cluster
        .coordinator
        .delete(standalone, 1, deadline())
        .await
        .unwrap();
    cluster.wait_snapshot(standalone, TabletPhase::Deleted).await;
    settle().await;

    let follower = cluster.follower();
    cluster.replicator.replay_into(&follower).unwrap();

    assert_eq!(
        follower.list_snapshots(SnapshotId::nil(), true).unwrap(),
        cluster.coordinator.list_snapshots(SnapshotId::nil(), true).unwrap()
    );
    assert_eq!(
        follower.list_schedules(ScheduleId::nil()).unwrap(),
        cluster.coordinator.list_schedules(ScheduleId::nil()).unwrap()
    );
    assert_eq!(
        follower.list_snapshots(standalone, true).unwrap()[0].state,
        TabletPhase::Deleted
    );
}
