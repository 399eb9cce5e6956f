use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::EntityType;
use crate::HybridTime;
use crate::Result;
use crate::ScheduleFilter;
use crate::ScheduleId;
use crate::SnapshotError;
use crate::SnapshotId;
use crate::SnapshotInfo;
use crate::WriteBatch;

/// Durable payload of a schedule record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleOptions {
    pub filter: ScheduleFilter,
    pub interval: Duration,
    pub retention: Duration,
    /// Set once the schedule is deleted.
    pub delete_time: Option<HybridTime>,
}

impl ScheduleOptions {
    pub fn new(
        filter: ScheduleFilter,
        interval: Duration,
        retention: Duration,
    ) -> Self {
        Self {
            filter,
            interval,
            retention,
            delete_time: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(SnapshotError::InvalidArgument("schedule interval must be positive".into()).into());
        }
        if self.retention < self.interval {
            return Err(SnapshotError::InvalidArgument(format!(
                "retention {:?} is shorter than interval {:?}",
                self.retention, self.interval
            ))
            .into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOperationKind {
    CreateSnapshot,
    Cleanup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotScheduleOperation {
    pub kind: ScheduleOperationKind,
    pub schedule_id: ScheduleId,
    /// Nil for cleanup.
    pub snapshot_id: SnapshotId,
    pub filter: ScheduleFilter,
    pub previous_snapshot_time: Option<HybridTime>,
}

/// Externally visible view of a schedule and the snapshots it retains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleInfo {
    pub id: ScheduleId,
    pub options: ScheduleOptions,
    pub snapshots: Vec<SnapshotInfo>,
}

#[derive(Debug, Clone)]
pub struct ScheduleState {
    id: ScheduleId,
    options: ScheduleOptions,
    /// Snapshot minted by the last create operation, until it finishes.
    creating_snapshot: Option<SnapshotId>,
}

impl ScheduleState {
    pub fn new(
        id: ScheduleId,
        options: ScheduleOptions,
    ) -> Self {
        Self {
            id,
            options,
            creating_snapshot: None,
        }
    }

    pub fn id(&self) -> ScheduleId {
        self.id
    }

    pub fn options(&self) -> &ScheduleOptions {
        &self.options
    }

    pub fn creating_snapshot(&self) -> Option<SnapshotId> {
        self.creating_snapshot
    }

    pub fn deleted(&self) -> bool {
        self.options.delete_time.is_some()
    }

    /// Replaces the options with a newer durable version. The in-flight
    /// creation survives because it is not part of the record.
    pub fn update_options(
        &mut self,
        options: ScheduleOptions,
    ) {
        self.options = options;
    }

    pub fn store_to_batch(
        &self,
        batch: &mut WriteBatch,
    ) -> Result<()> {
        batch.put(EntityType::SnapshotSchedule, self.id.as_bytes(), &self.options)
    }

    /// Emits at most one operation: the record cleanup of a deleted schedule,
    /// or the next snapshot once `interval` passed since `last_snapshot_time`.
    pub fn prepare_operations(
        &mut self,
        last_snapshot_time: Option<HybridTime>,
        now: HybridTime,
        cleanup_delay: Duration,
        out: &mut Vec<SnapshotScheduleOperation>,
    ) {
        if let Some(delete_time) = self.options.delete_time {
            if now > delete_time.add_duration(cleanup_delay) {
                out.push(SnapshotScheduleOperation {
                    kind: ScheduleOperationKind::Cleanup,
                    schedule_id: self.id,
                    snapshot_id: SnapshotId::nil(),
                    filter: self.options.filter.clone(),
                    previous_snapshot_time: None,
                });
            }
            return;
        }
        if self.creating_snapshot.is_some() {
            return;
        }
        if let Some(last) = last_snapshot_time {
            if last.add_duration(self.options.interval) > now {
                return;
            }
        }
        out.push(self.make_create_snapshot_operation(last_snapshot_time));
    }

    pub fn force_create_snapshot(
        &mut self,
        last_snapshot_time: Option<HybridTime>,
    ) -> Result<SnapshotScheduleOperation> {
        if let Some(creating) = self.creating_snapshot {
            return Err(SnapshotError::ParallelOperation(format!(
                "schedule {} is creating snapshot {}",
                self.id, creating
            ))
            .into());
        }
        Ok(self.make_create_snapshot_operation(last_snapshot_time))
    }

    /// Clears the in-flight creation if it is `snapshot_id`.
    pub fn snapshot_finished(
        &mut self,
        snapshot_id: SnapshotId,
        result: &Result<()>,
    ) {
        if self.creating_snapshot != Some(snapshot_id) {
            return;
        }
        debug!(
            "schedule {}: snapshot {} finished: {:?}",
            self.id,
            snapshot_id,
            result.as_ref().err()
        );
        self.creating_snapshot = None;
    }

    fn make_create_snapshot_operation(
        &mut self,
        last_snapshot_time: Option<HybridTime>,
    ) -> SnapshotScheduleOperation {
        let snapshot_id = SnapshotId::generate_random();
        self.creating_snapshot = Some(snapshot_id);
        SnapshotScheduleOperation {
            kind: ScheduleOperationKind::CreateSnapshot,
            schedule_id: self.id,
            snapshot_id,
            filter: self.options.filter.clone(),
            previous_snapshot_time: last_snapshot_time,
        }
    }
}
