//! Coordinator state advertised to tablet workers.

use std::collections::BTreeMap;

use super::SnapshotCoordinator;
use crate::CatalogStore;
use crate::EntityType;
use crate::HybridTime;
use crate::RestorationId;
use crate::Result;
use crate::ScheduleFilter;
use crate::ScheduleId;
use crate::TableInfo;
use crate::TypeConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatSchedule {
    pub id: ScheduleId,
    pub last_snapshot_time: Option<HybridTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatRestoration {
    pub id: RestorationId,
    pub complete_time: Option<HybridTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartbeatResponse {
    pub schedules: Vec<HeartbeatSchedule>,
    pub last_restorations_update_time: Option<HybridTime>,
    pub restorations: Vec<HeartbeatRestoration>,
}

impl<T> SnapshotCoordinator<T>
where T: TypeConfig
{
    /// Adds live schedules and every restoration to `resp`.
    pub fn fill_heartbeat(
        &self,
        resp: &mut HeartbeatResponse,
    ) {
        let state = self.inner.state.lock();
        for schedule in state.schedules.values() {
            if schedule.deleted() {
                continue;
            }
            let last_snapshot_time = state
                .snapshots
                .bounding_live_snapshots(schedule.id())
                .map(|(_, last)| last.snapshot_time());
            resp.schedules.push(HeartbeatSchedule {
                id: schedule.id(),
                last_snapshot_time,
            });
        }
        resp.last_restorations_update_time = Some(state.last_restorations_update);
        resp.restorations
            .extend(state.restorations.values().map(|r| HeartbeatRestoration {
                id: r.id(),
                complete_time: r.complete_time(),
            }));
    }

    /// Ids of the `entity_type` objects each live schedule covers now,
    /// sorted per schedule.
    pub fn make_schedules_to_object_ids(
        &self,
        entity_type: EntityType,
    ) -> Result<BTreeMap<ScheduleId, Vec<String>>> {
        let filters: Vec<(ScheduleId, ScheduleFilter)> = {
            let state = self.inner.state.lock();
            state
                .schedules
                .values()
                .filter(|s| !s.deleted())
                .map(|s| (s.id(), s.options().filter.clone()))
                .collect()
        };

        let mut result = BTreeMap::new();
        for (schedule_id, filter) in filters {
            let mut ids: Vec<String> = self
                .inner
                .catalog
                .collect_entries(&filter)?
                .into_iter()
                .filter(|entry| entry.entity_type == entity_type)
                .map(|entry| entry.id)
                .collect();
            ids.sort();
            ids.dedup();
            result.insert(schedule_id, ids);
        }
        Ok(result)
    }

    pub fn is_table_covered_by_some_schedule(
        &self,
        table: &TableInfo,
    ) -> bool {
        let state = self.inner.state.lock();
        state
            .schedules
            .values()
            .any(|s| !s.deleted() && s.options().filter.matches(table))
    }
}
