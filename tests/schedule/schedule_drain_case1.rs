//! Case 1: a deleted schedule drains its snapshots before its record goes
//!
//! Scenario:
//!
//! 1. Schedule K takes two snapshots.
//! 2. Delete K.
//! 3. Tick until nothing is left.
//!
//! Expected Result:
//!
//! - both snapshots are deleted first
//! - K is tombstoned only once they are gone and
//!   `now > delete_time + schedule_cleanup_delay`

use std::time::Duration;

use d_snapshot_coordinator::EntityType;
use d_snapshot_coordinator::HybridTime;
use d_snapshot_coordinator::ScheduleId;
use d_snapshot_coordinator::TabletOpType;
use d_snapshot_coordinator::TabletPhase;

use crate::common::config;
use crate::common::deadline;
use crate::common::namespace_schedule;
use crate::common::table;
use crate::common::Cluster;

#[tokio::test]
async fn test_schedule_drain_case1() {
    let mut config = config();
    config.schedule_cleanup_delay_ms = 10_000;
    let cluster = Cluster::with_config(1, config);
    cluster
        .catalog
        .add_table(table("tb1", "db", "orders"), &["t1"], HybridTime::from_secs(1));
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
        .delete_schedule(schedule_id, 1, deadline())
        .await
        .unwrap();
    cluster.tick().await;
    let snapshots = cluster.schedule(schedule_id).snapshots;
    assert_eq!(snapshots.len(), 2);
    assert!(snapshots.iter().all(|s| s.state == TabletPhase::Deleted));
    assert_eq!(cluster.fleet.requests_of(TabletOpType::Delete).len(), 2);

    cluster.tick().await;
    assert!(cluster.schedule(schedule_id).snapshots.is_empty());

    // Drained, but still within the schedule cleanup delay.
    cluster.set_time(Duration::from_secs(11));
    cluster.tick().await;
    assert_eq!(cluster.coordinator.list_schedules(ScheduleId::nil()).unwrap().len(), 1);

    cluster.clock.advance(Duration::from_millis(1));
    cluster.tick().await;
    assert!(cluster.coordinator.list_schedules(ScheduleId::nil()).unwrap().is_empty());
    assert_eq!(cluster.catalog.record_count(EntityType::SnapshotSchedule), 0);
    assert_eq!(cluster.catalog.record_count(EntityType::Snapshot), 0);
}
