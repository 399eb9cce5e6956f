//! Replicated apply path.
//!
//! Runs on every replica in log order. Only the in-memory indices and the
//! catalog store are touched for [`crate::UNKNOWN_TERM`]; tablet RPCs and
//! follow-up writes are issued by the leader alone.

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::CoordinatorInner;
use super::CoordinatorState;
use crate::decode_key;
use crate::decode_payload;
use crate::decode_value;
use crate::CatalogStore;
use crate::CreateSnapshotData;
use crate::EntityType;
use crate::LogApplier;
use crate::LogEntry;
use crate::RecordValue;
use crate::Result;
use crate::ScheduleId;
use crate::ScheduleOptions;
use crate::ScheduleState;
use crate::SnapshotError;
use crate::SnapshotId;
use crate::SnapshotRecord;
use crate::SnapshotState;
use crate::TabletPhase;
use crate::TypeConfig;
use crate::WriteBatch;
use crate::WritePair;

impl<T> LogApplier for CoordinatorInner<T>
where T: TypeConfig
{
    fn apply(
        &self,
        leader_term: i64,
        entry: &LogEntry,
    ) -> Result<()> {
        trace!("apply {} in term {}", entry.name(), leader_term);
        match entry {
            LogEntry::CreateSnapshot(data) => self.create_replicated(leader_term, data),
            LogEntry::DeleteSnapshot { snapshot_id } => self.delete_replicated(leader_term, *snapshot_id),
            LogEntry::RestoreSysCatalog {
                snapshot_id,
                restore_at,
                restoration_id,
            } => self.restore_sys_catalog_replicated(leader_term, *snapshot_id, *restore_at, *restoration_id),
            LogEntry::WriteBatch(batch) => self.apply_write_batch(batch),
        }
    }
}

impl<T> CoordinatorInner<T>
where T: TypeConfig
{
    pub(crate) fn create_replicated(
        &self,
        leader_term: i64,
        data: &CreateSnapshotData,
    ) -> Result<()> {
        let now = self.now();
        let mut snapshot = SnapshotState::new(data, now);
        let mut batch = WriteBatch::new();
        snapshot.store_to_batch(&mut batch)?;

        let mut operations = Vec::new();
        let finished = {
            let mut state = self.state.lock();
            if state.snapshots.contains(&data.snapshot_id) {
                return Err(SnapshotError::AlreadyExists {
                    entity: "snapshot",
                    id: data.snapshot_id.to_string(),
                }
                .into());
            }
            self.catalog.apply_write_batch(&batch)?;
            if leader_term >= 0 {
                snapshot.prepare_operations(&mut operations);
            }
            let finished = leader_term >= 0 && snapshot.all_tablets_done();
            snapshot.set_needs_update(finished);
            if state.snapshots.insert(snapshot).is_err() {
                return Err(SnapshotError::AlreadyExists {
                    entity: "snapshot",
                    id: data.snapshot_id.to_string(),
                }
                .into());
            }
            finished
        };
        info!(
            "snapshot {} created over {} tablets at {}",
            data.snapshot_id,
            data.tablet_ids.len(),
            data.snapshot_time
        );

        if leader_term < 0 {
            return Ok(());
        }
        if finished {
            let snapshot_id = data.snapshot_id;
            if let Some(this) = self.arc() {
                self.spawn("update snapshot", async move {
                    this.update_snapshot_if_done(snapshot_id, leader_term);
                });
            }
        }
        self.execute_operations(operations, leader_term);
        Ok(())
    }

    pub(crate) fn delete_replicated(
        &self,
        leader_term: i64,
        snapshot_id: SnapshotId,
    ) -> Result<()> {
        let now = self.now();
        let mut operations = Vec::new();
        let finished = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let snapshot = match state.snapshots.get_mut(&snapshot_id) {
                Some(snapshot) => snapshot,
                None => {
                    warn!("delete of unknown snapshot {}", snapshot_id);
                    return Err(CoordinatorState::snapshot_not_found(snapshot_id));
                }
            };
            // A failed creation may still be the schedule's in-flight one.
            if let Some(schedule_id) = snapshot.schedule_id() {
                if let Some(schedule) = state.schedules.get_mut(&schedule_id) {
                    schedule.snapshot_finished(snapshot_id, &snapshot.any_failure());
                }
            }
            snapshot.set_initial_phase(TabletPhase::Deleting, now);
            let mut batch = WriteBatch::new();
            snapshot.store_to_batch(&mut batch)?;
            self.catalog.apply_write_batch(&batch)?;
            if leader_term >= 0 {
                snapshot.prepare_operations(&mut operations);
            }
            let finished = leader_term >= 0 && snapshot.all_tablets_done();
            snapshot.set_needs_update(finished);
            finished
        };
        info!("snapshot {} deleting", snapshot_id);

        if leader_term < 0 {
            return Ok(());
        }
        if finished {
            if let Some(this) = self.arc() {
                self.spawn("update snapshot", async move {
                    this.update_snapshot_if_done(snapshot_id, leader_term);
                });
            }
        }
        self.execute_operations(operations, leader_term);
        Ok(())
    }

    /// Persists the batch, then mirrors every pair into the indices.
    pub(crate) fn apply_write_batch(
        &self,
        batch: &WriteBatch,
    ) -> Result<()> {
        self.catalog.apply_write_batch(batch)?;
        for pair in batch.pairs() {
            self.apply_write_pair(pair)?;
        }
        Ok(())
    }

    pub(crate) fn apply_write_pair(
        &self,
        pair: &WritePair,
    ) -> Result<()> {
        let (entity_type, id) = decode_key(&pair.key)?;
        let value = decode_value(&pair.value)?;
        match entity_type {
            EntityType::Snapshot => self.apply_snapshot_value(SnapshotId::from_slice(&id)?, value),
            EntityType::SnapshotSchedule => self.apply_schedule_value(ScheduleId::from_slice(&id)?, value),
            other => {
                debug!("ignore write of {:?} record", other);
                Ok(())
            }
        }
    }

    fn apply_snapshot_value(
        &self,
        snapshot_id: SnapshotId,
        value: RecordValue<'_>,
    ) -> Result<()> {
        let now = self.now();
        let mut state = self.state.lock();
        match value {
            RecordValue::Tombstone => {
                if state.snapshots.remove(&snapshot_id).is_none() {
                    error!("tombstone of unknown snapshot {}", snapshot_id);
                } else {
                    info!("snapshot {} cleaned up", snapshot_id);
                }
            }
            RecordValue::Payload(bytes) => {
                let record: SnapshotRecord = decode_payload(bytes)?;
                if let Some(current) = state.snapshots.get(&snapshot_id) {
                    if !current.should_update(&record) {
                        trace!(
                            "skip snapshot {} version {}, have {}",
                            snapshot_id,
                            record.version,
                            current.version()
                        );
                        return Ok(());
                    }
                }
                state
                    .snapshots
                    .replace(SnapshotState::from_record(snapshot_id, record, now));
            }
        }
        Ok(())
    }

    fn apply_schedule_value(
        &self,
        schedule_id: ScheduleId,
        value: RecordValue<'_>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        match value {
            RecordValue::Tombstone => {
                if state.schedules.remove(&schedule_id).is_none() {
                    error!("tombstone of unknown schedule {}", schedule_id);
                } else {
                    info!("snapshot schedule {} cleaned up", schedule_id);
                }
            }
            RecordValue::Payload(bytes) => {
                let options: ScheduleOptions = decode_payload(bytes)?;
                match state.schedules.get_mut(&schedule_id) {
                    Some(schedule) => schedule.update_options(options),
                    None => {
                        state
                            .schedules
                            .insert(schedule_id, ScheduleState::new(schedule_id, options));
                    }
                }
            }
        }
        Ok(())
    }

    /// Replays the stored records of `entity_type` into the indices.
    pub(crate) fn load_records(
        &self,
        entity_type: EntityType,
    ) -> Result<usize> {
        let pairs = self.catalog.scan(entity_type)?;
        for pair in &pairs {
            self.apply_write_pair(pair)?;
        }
        Ok(pairs.len())
    }
}
