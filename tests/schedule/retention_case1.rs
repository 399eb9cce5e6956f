//! Case 1: the schedule tick creates snapshots and retention prunes them
//!
//! Scenario:
//!
//! 1. Create a schedule with interval=1s and retention=3s.
//! 2. Tick with the clock at t=0,1,2,3,4,5 and workers answering ok.
//! 3. Tick once more just after t=5.
//!
//! Expected Result:
//!
//! - one snapshot per second, each linked to its predecessor
//! - after every tick the earliest retained snapshot is within the window
//! - one expired snapshot is dropped per tick, so {2,3,4,5} are live at t=5
//!   and {3,4,5} right after, with the dropped ones tombstoned
//!
//! Note: a snapshot expires only when it is strictly older than
//! now - retention. At t=5 snapshot 2 sits exactly on that boundary and is
//! kept; snapshot 1 is the one expired snapshot dropped by that tick. Just
//! after t=5 snapshot 2 is strictly older and goes.

use std::time::Duration;

use d_snapshot_coordinator::EntityType;
use d_snapshot_coordinator::HybridTime;
use d_snapshot_coordinator::TabletPhase;

use crate::common::deadline;
use crate::common::namespace_schedule;
use crate::common::table;
use crate::common::Cluster;
use crate::common::START;

fn at(secs: u64) -> HybridTime {
    START.add_duration(Duration::from_secs(secs))
}

#[tokio::test]
async fn test_retention_case1() {
    let cluster = Cluster::new(1);
    cluster
        .catalog
        .add_table(table("tb1", "db", "orders"), &["t1", "t2"], HybridTime::from_secs(1));
    let retention = Duration::from_secs(3);
    let schedule_id = cluster
        .coordinator
        .create_schedule(namespace_schedule("db", Duration::from_secs(1), retention), 1, deadline())
        .await
        .unwrap();

    for second in 0..=5 {
        cluster.set_time(Duration::from_secs(second));
        cluster.tick().await;

        let live: Vec<_> = cluster
            .schedule(schedule_id)
            .snapshots
            .into_iter()
            .filter(|s| s.state == TabletPhase::Complete)
            .collect();
        assert_eq!(live.last().map(|s| s.snapshot_time), Some(at(second)));
        if live.len() > 1 {
            assert!(live[0].snapshot_time >= at(second).sub_duration(retention));
        }
        for pair in live.windows(2) {
            assert!(pair[1].snapshot_time > pair[0].snapshot_time);
            assert_eq!(pair[1].previous_snapshot_time, Some(pair[0].snapshot_time));
        }
    }

    let live_times = |cluster: &Cluster| -> Vec<HybridTime> {
        cluster
            .schedule(schedule_id)
            .snapshots
            .into_iter()
            .filter(|s| s.state == TabletPhase::Complete)
            .map(|s| s.snapshot_time)
            .collect()
    };
    assert_eq!(live_times(&cluster), vec![at(2), at(3), at(4), at(5)]);

    cluster.clock.advance(Duration::from_millis(1));
    cluster.tick().await;
    cluster.tick().await;

    assert_eq!(live_times(&cluster), vec![at(3), at(4), at(5)]);
    assert_eq!(cluster.schedule(schedule_id).snapshots.len(), 3);
    assert_eq!(cluster.catalog.record_count(EntityType::Snapshot), 3);
}
