use std::collections::BTreeSet;
use std::collections::HashMap;

use crate::HybridTime;
use crate::ScheduleId;
use crate::SnapshotId;
use crate::SnapshotState;

type ScheduleKey = (ScheduleId, HybridTime, SnapshotId);

/// Snapshots by id, plus every schedule-linked snapshot ordered by
/// `(schedule_id, snapshot_time)` for first/last lookups.
#[derive(Debug, Default)]
pub(crate) struct SnapshotIndex {
    by_id: HashMap<SnapshotId, SnapshotState>,
    by_schedule: BTreeSet<ScheduleKey>,
}

impl SnapshotIndex {
    pub(crate) fn contains(
        &self,
        id: &SnapshotId,
    ) -> bool {
        self.by_id.contains_key(id)
    }

    pub(crate) fn get(
        &self,
        id: &SnapshotId,
    ) -> Option<&SnapshotState> {
        self.by_id.get(id)
    }

    /// Schedule linkage and snapshot time must not be changed through the
    /// returned reference; use [`Self::replace`] for that.
    pub(crate) fn get_mut(
        &mut self,
        id: &SnapshotId,
    ) -> Option<&mut SnapshotState> {
        self.by_id.get_mut(id)
    }

    /// Inserts `snapshot`, returning it back if the id is taken.
    pub(crate) fn insert(
        &mut self,
        snapshot: SnapshotState,
    ) -> std::result::Result<(), SnapshotState> {
        if self.by_id.contains_key(&snapshot.id()) {
            return Err(snapshot);
        }
        if let Some(key) = schedule_key(&snapshot) {
            self.by_schedule.insert(key);
        }
        self.by_id.insert(snapshot.id(), snapshot);
        Ok(())
    }

    pub(crate) fn replace(
        &mut self,
        snapshot: SnapshotState,
    ) {
        self.remove(&snapshot.id());
        if let Some(key) = schedule_key(&snapshot) {
            self.by_schedule.insert(key);
        }
        self.by_id.insert(snapshot.id(), snapshot);
    }

    pub(crate) fn remove(
        &mut self,
        id: &SnapshotId,
    ) -> Option<SnapshotState> {
        let snapshot = self.by_id.remove(id)?;
        if let Some(key) = schedule_key(&snapshot) {
            self.by_schedule.remove(&key);
        }
        Some(snapshot)
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &SnapshotState> {
        self.by_id.values()
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut SnapshotState> {
        self.by_id.values_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Ids of the snapshots of `schedule_id`, oldest first.
    pub(crate) fn schedule_snapshot_ids(
        &self,
        schedule_id: ScheduleId,
    ) -> Vec<SnapshotId> {
        self.schedule_range(schedule_id).map(|(_, _, id)| *id).collect()
    }

    pub(crate) fn has_schedule_snapshots(
        &self,
        schedule_id: ScheduleId,
    ) -> bool {
        self.schedule_range(schedule_id).next().is_some()
    }

    /// Oldest and newest snapshot of `schedule_id` that is not being deleted.
    pub(crate) fn bounding_live_snapshots(
        &self,
        schedule_id: ScheduleId,
    ) -> Option<(&SnapshotState, &SnapshotState)> {
        let mut live = self
            .schedule_range(schedule_id)
            .filter_map(|(_, _, id)| self.by_id.get(id))
            .filter(|snapshot| !snapshot.is_deleting());
        let first = live.next()?;
        let last = live.last().unwrap_or(first);
        Some((first, last))
    }

    fn schedule_range(
        &self,
        schedule_id: ScheduleId,
    ) -> impl Iterator<Item = &ScheduleKey> {
        self.by_schedule
            .range((schedule_id, HybridTime::MIN, SnapshotId::nil())..)
            .take_while(move |(id, _, _)| *id == schedule_id)
    }
}

fn schedule_key(snapshot: &SnapshotState) -> Option<ScheduleKey> {
    snapshot
        .schedule_id()
        .map(|schedule_id| (schedule_id, snapshot.snapshot_time(), snapshot.id()))
}
