//! Case 2: a failed schedule snapshot is deleted while one tablet keeps retrying
//!
//! Scenario:
//!
//! 1. Create a snapshot for a schedule over t1 and t2; the worker of t2
//!    aborts, the worker of t1 stays unavailable.
//! 2. Delete the snapshot before t1 ever answers.
//! 3. Ask the schedule for another snapshot once the workers recover.
//!
//! Expected Result:
//!
//! - the snapshot aggregates to FAILED and the delete is accepted
//! - both tablets get DELETE_ON_TABLET and the snapshot reaches DELETED
//! - the schedule is no longer busy and its next snapshot completes

use std::time::Duration;

use d_snapshot_coordinator::HybridTime;
use d_snapshot_coordinator::TabletOpType;
use d_snapshot_coordinator::TabletPhase;
use tonic::Status;

use crate::common::deadline;
use crate::common::namespace_schedule;
use crate::common::settle;
use crate::common::table;
use crate::common::Cluster;

#[tokio::test]
async fn test_failed_snapshot_case2() {
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
    cluster
        .fleet
        .fail_with("t1", TabletOpType::Create, Status::unavailable("leader moved"));
    cluster
        .fleet
        .fail_with("t2", TabletOpType::Create, Status::aborted("tablet is being split"));

    let failed = cluster
        .coordinator
        .create_for_schedule(schedule_id, 1, deadline())
        .await
        .unwrap();
    cluster.wait_snapshot(failed, TabletPhase::Failed).await;
    settle().await;
    let tablets = cluster.snapshot(failed).tablets;
    assert!(tablets
        .iter()
        .any(|t| t.id == "t1" && t.phase == TabletPhase::Creating));

    cluster.coordinator.delete(failed, 1, deadline()).await.unwrap();
    cluster.wait_snapshot(failed, TabletPhase::Deleted).await;
    let mut deleted: Vec<_> = cluster
        .fleet
        .requests_of(TabletOpType::Delete)
        .into_iter()
        .map(|(tablet_id, _)| tablet_id)
        .collect();
    deleted.sort();
    assert_eq!(deleted, vec!["t1", "t2"]);

    cluster.fleet.clear_failures();
    cluster.clock.advance(Duration::from_secs(1));
    let next = cluster
        .coordinator
        .create_for_schedule(schedule_id, 1, deadline())
        .await
        .unwrap();
    cluster.wait_snapshot(next, TabletPhase::Complete).await;
}
