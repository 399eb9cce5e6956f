//! Case 1: point in time restore of a schedule snapshot
//!
//! Scenario:
//!
//! 1. Leader at term 7 runs a schedule and snapshot S completes.
//! 2. Restore S at its own snapshot time.
//! 3. The restored catalog finishes loading at term 7.
//!
//! Expected Result:
//!
//! - tablets are untouched until the catalog loaded
//! - RESTORE_ON_TABLET goes to t1 and t2 with metadata
//! - the restoration completes and shows up in the heartbeat

use std::time::Duration;

use d_snapshot_coordinator::HeartbeatResponse;
use d_snapshot_coordinator::HybridTime;
use d_snapshot_coordinator::RestorationId;
use d_snapshot_coordinator::TabletOpType;
use d_snapshot_coordinator::TabletPhase;
use d_snapshot_coordinator::TabletRequest;

use crate::common::deadline;
use crate::common::namespace_schedule;
use crate::common::table;
use crate::common::wait_for;
use crate::common::Cluster;
use crate::common::START;

const TERM: i64 = 7;

#[tokio::test]
async fn test_point_in_time_restore_case1() {
    let cluster = Cluster::new(TERM);
    cluster
        .catalog
        .add_table(table("tb1", "db", "orders"), &["t1", "t2"], HybridTime::from_secs(1));
    let schedule_id = cluster
        .coordinator
        .create_schedule(
            namespace_schedule("db", Duration::from_secs(60), Duration::from_secs(600)),
            TERM,
            deadline(),
        )
        .await
        .unwrap();
    let snapshot_id = cluster
        .coordinator
        .create_for_schedule(schedule_id, TERM, deadline())
        .await
        .unwrap();
    cluster.wait_snapshot(snapshot_id, TabletPhase::Complete).await;
    cluster.set_time(Duration::from_secs(30));

    let restoration_id = cluster
        .coordinator
        .restore(snapshot_id, START, TERM)
        .await
        .unwrap();
    assert_eq!(cluster.coordinator.postponed_restores_len(), 1);
    assert!(cluster.fleet.requests_of(TabletOpType::Restore).is_empty());

    cluster.coordinator.sys_catalog_loaded(TERM);

    let restoration = |id: RestorationId| {
        cluster
            .coordinator
            .list_restorations(id, snapshot_id)
            .unwrap()
            .remove(0)
    };
    assert!(wait_for(|| restoration(restoration_id).state == TabletPhase::Restored).await);

    let mut restored: Vec<_> = cluster
        .fleet
        .requests_of(TabletOpType::Restore)
        .into_iter()
        .map(|(tablet_id, request)| {
            match request {
                TabletRequest::RestoreOnTablet {
                    snapshot_id: restored_id,
                    restore_at,
                    send_metadata,
                    ..
                } => {
                    assert_eq!(restored_id, snapshot_id);
                    assert_eq!(restore_at, START);
                    assert!(send_metadata);
                }
                other => panic!("unexpected request {:?}", other),
            }
            tablet_id
        })
        .collect();
    restored.sort();
    assert_eq!(restored, vec!["t1".to_string(), "t2".to_string()]);

    let complete_time = START.add_duration(Duration::from_secs(30));
    assert_eq!(restoration(restoration_id).complete_time, Some(complete_time));
    assert!(wait_for(|| cluster.fleet.requests_of(TabletOpType::RestoreFinished).len() == 2).await);

    let mut resp = HeartbeatResponse::default();
    cluster.coordinator.fill_heartbeat(&mut resp);
    assert_eq!(resp.last_restorations_update_time, Some(complete_time));
    assert_eq!(resp.restorations.len(), 1);
    assert_eq!(resp.restorations[0].id, restoration_id);
}
