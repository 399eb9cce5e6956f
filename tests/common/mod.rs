use std::sync::Arc;
use std::time::Duration;

use d_snapshot_coordinator::CatalogEntry;
use d_snapshot_coordinator::CoordinatorConfig;
use d_snapshot_coordinator::HybridTime;
use d_snapshot_coordinator::ManualClock;
use d_snapshot_coordinator::MemCatalogStore;
use d_snapshot_coordinator::MemReplicator;
use d_snapshot_coordinator::MemTabletFleet;
use d_snapshot_coordinator::ScheduleFilter;
use d_snapshot_coordinator::ScheduleId;
use d_snapshot_coordinator::ScheduleInfo;
use d_snapshot_coordinator::ScheduleOptions;
use d_snapshot_coordinator::SnapshotCoordinator;
use d_snapshot_coordinator::SnapshotId;
use d_snapshot_coordinator::SnapshotInfo;
use d_snapshot_coordinator::TableIdentifier;
use d_snapshot_coordinator::TableInfo;
use d_snapshot_coordinator::TabletPhase;
use d_snapshot_coordinator::TypeConfig;
use tokio::time::Instant;

pub const START: HybridTime = HybridTime::from_secs(10_000);

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct TestTypeConfig;

impl TypeConfig for TestTypeConfig {
    type R = MemReplicator;

    type F = MemTabletFleet;

    type C = MemCatalogStore;

    type CL = ManualClock;
}

/// One coordinator replica wired to in-process collaborators.
pub struct Cluster {
    pub coordinator: SnapshotCoordinator<TestTypeConfig>,
    pub replicator: Arc<MemReplicator>,
    pub fleet: Arc<MemTabletFleet>,
    pub catalog: Arc<MemCatalogStore>,
    pub clock: Arc<ManualClock>,
}

impl Cluster {
    pub fn new(term: i64) -> Self {
        Self::with_config(term, config())
    }

    pub fn with_config(
        term: i64,
        config: CoordinatorConfig,
    ) -> Self {
        let replicator = Arc::new(MemReplicator::new(term));
        let fleet = Arc::new(MemTabletFleet::new());
        let catalog = Arc::new(MemCatalogStore::new());
        let clock = Arc::new(ManualClock::new(START));
        let coordinator = SnapshotCoordinator::new(
            config,
            replicator.clone(),
            fleet.clone(),
            catalog.clone(),
            clock.clone(),
        );
        replicator.set_applier(coordinator.log_applier());
        Self {
            coordinator,
            replicator,
            fleet,
            catalog,
            clock,
        }
    }

    /// A follower replica sharing nothing but what the log carries.
    pub fn follower(&self) -> SnapshotCoordinator<TestTypeConfig> {
        SnapshotCoordinator::new(
            config(),
            Arc::new(MemReplicator::new(-1)),
            Arc::new(MemTabletFleet::new()),
            Arc::new(MemCatalogStore::new()),
            Arc::new(ManualClock::new(START)),
        )
    }

    pub fn set_time(
        &self,
        offset: Duration,
    ) {
        self.clock.set(START.add_duration(offset));
    }

    /// Runs one tick and lets every RPC and write it started settle.
    pub async fn tick(&self) {
        self.coordinator.poll();
        settle().await;
    }

    pub fn snapshot(
        &self,
        snapshot_id: SnapshotId,
    ) -> SnapshotInfo {
        self.coordinator
            .list_snapshots(snapshot_id, true)
            .expect("snapshot is listed")
            .remove(0)
    }

    pub fn schedule(
        &self,
        schedule_id: ScheduleId,
    ) -> ScheduleInfo {
        self.coordinator
            .list_schedules(schedule_id)
            .expect("schedule is listed")
            .remove(0)
    }

    pub async fn wait_snapshot(
        &self,
        snapshot_id: SnapshotId,
        phase: TabletPhase,
    ) {
        assert!(
            wait_for(|| self.snapshot(snapshot_id).state == phase).await,
            "snapshot {} never reached {}",
            snapshot_id,
            phase
        );
    }
}

pub fn config() -> CoordinatorConfig {
    CoordinatorConfig {
        cleanup_delay_ms: 0,
        schedule_cleanup_delay_ms: 0,
        sys_catalog_write_timeout_ms: 1000,
        ..Default::default()
    }
}

pub fn deadline() -> Instant {
    Instant::now() + Duration::from_secs(10)
}

pub fn tablets(ids: &[&str]) -> Vec<CatalogEntry> {
    ids.iter().map(|id| CatalogEntry::tablet(*id)).collect()
}

pub fn table(
    id: &str,
    namespace: &str,
    name: &str,
) -> TableInfo {
    TableInfo {
        id: id.into(),
        namespace: namespace.into(),
        name: name.into(),
        schema: format!("schema-of-{}", id).into_bytes(),
    }
}

pub fn namespace_schedule(
    namespace: &str,
    interval: Duration,
    retention: Duration,
) -> ScheduleOptions {
    ScheduleOptions::new(
        ScheduleFilter::new(vec![TableIdentifier::namespace(namespace)]),
        interval,
        retention,
    )
}

/// Yields to spawned tasks until `condition` holds.
pub async fn wait_for<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..1000 {
        if condition() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    condition()
}

pub async fn settle() {
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
}
