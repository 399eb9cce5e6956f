use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::CatalogEntry;
use crate::CoordinatorConfig;
use crate::HybridTime;
use crate::ManualClock;
use crate::MemCatalogStore;
use crate::MemReplicator;
use crate::MemTabletFleet;
use crate::SnapshotCoordinator;
use crate::TableInfo;
use crate::TypeConfig;

pub(crate) const TEST_TERM: i64 = 1;

/// Coordinator collaborators that answer in-process.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct MemTypeConfig;

impl TypeConfig for MemTypeConfig {
    type R = MemReplicator;

    type F = MemTabletFleet;

    type C = MemCatalogStore;

    type CL = ManualClock;
}

pub(crate) struct TestContext {
    pub(crate) coordinator: SnapshotCoordinator<MemTypeConfig>,
    pub(crate) replicator: Arc<MemReplicator>,
    pub(crate) fleet: Arc<MemTabletFleet>,
    pub(crate) catalog: Arc<MemCatalogStore>,
    pub(crate) clock: Arc<ManualClock>,
}

impl TestContext {
    pub(crate) fn new() -> Self {
        Self::with_config(test_config(), HybridTime::from_secs(1_000))
    }

    pub(crate) fn with_config(
        config: CoordinatorConfig,
        start: HybridTime,
    ) -> Self {
        let replicator = Arc::new(MemReplicator::new(TEST_TERM));
        let fleet = Arc::new(MemTabletFleet::new());
        let catalog = Arc::new(MemCatalogStore::new());
        let clock = Arc::new(ManualClock::new(start));
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
}

/// No cleanup delays, short write timeout.
pub(crate) fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        cleanup_delay_ms: 0,
        schedule_cleanup_delay_ms: 0,
        sys_catalog_write_timeout_ms: 1000,
        ..Default::default()
    }
}

pub(crate) fn deadline() -> Instant {
    Instant::now() + Duration::from_secs(10)
}

pub(crate) fn tablet_entries(tablet_ids: &[&str]) -> Vec<CatalogEntry> {
    tablet_ids.iter().map(|id| CatalogEntry::tablet(*id)).collect()
}

pub(crate) fn table_info(
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

/// Yields to spawned tasks until `condition` holds.
pub(crate) async fn wait_for<F>(mut condition: F) -> bool
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
