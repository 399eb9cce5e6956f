use std::time::Duration;

use d_snapshot_coordinator::ErrorKind;
use d_snapshot_coordinator::HybridTime;
use d_snapshot_coordinator::TabletPhase;

use crate::common::deadline;
use crate::common::namespace_schedule;
use crate::common::table;
use crate::common::Cluster;

#[tokio::test]
async fn test_racing_create_for_schedule_admits_one() {
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

    let (first, second) = tokio::join!(
        cluster.coordinator.create_for_schedule(schedule_id, 1, deadline()),
        cluster.coordinator.create_for_schedule(schedule_id, 1, deadline()),
    );

    let (created, rejected) = match (first, second) {
        (Ok(id), Err(e)) | (Err(e), Ok(id)) => (id, e),
        other => panic!("expected exactly one creation, got {:?}", other),
    };
    assert_eq!(rejected.kind(), ErrorKind::ParallelOperation);
    cluster.wait_snapshot(created, TabletPhase::Complete).await;
    assert_eq!(cluster.schedule(schedule_id).snapshots.len(), 1);

    // The schedule accepts a new creation once the first one finished.
    cluster.clock.advance(Duration::from_secs(1));
    let next = cluster
        .coordinator
        .create_for_schedule(schedule_id, 1, deadline())
        .await
        .unwrap();
    cluster.wait_snapshot(next, TabletPhase::Complete).await;
    let snapshots = cluster.schedule(schedule_id).snapshots;
    assert_eq!(snapshots[1].previous_snapshot_time, Some(snapshots[0].snapshot_time));
}
