use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tonic::Code;
use tracing::debug;

use super::StateWithTablets;
use super::TabletEntry;
use super::TabletPhase;
use crate::CatalogEntry;
use crate::EntityType;
use crate::HybridTime;
use crate::Result;
use crate::ScheduleId;
use crate::SnapshotError;
use crate::SnapshotId;
use crate::TabletId;
use crate::TabletRequest;
use crate::WriteBatch;

/// Worker errors after which retrying a snapshot operation is pointless.
pub fn is_snapshot_terminal_failure(status: &tonic::Status) -> bool {
    matches!(
        status.code(),
        Code::Aborted | Code::InvalidArgument | Code::NotFound
    )
}

/// Durable payload of a snapshot record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub initial_phase: TabletPhase,
    pub tablets: Vec<TabletEntry>,
    pub snapshot_time: HybridTime,
    pub previous_snapshot_time: Option<HybridTime>,
    pub schedule_id: Option<ScheduleId>,
    pub imported: bool,
    pub entries: Vec<CatalogEntry>,
    pub version: u32,
}

/// Parameters of a CREATE_SNAPSHOT log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSnapshotData {
    pub snapshot_id: SnapshotId,
    pub schedule_id: Option<ScheduleId>,
    pub previous_snapshot_time: Option<HybridTime>,
    pub snapshot_time: HybridTime,
    pub tablet_ids: Vec<TabletId>,
    pub imported: bool,
    pub entries: Vec<CatalogEntry>,
}

/// One CREATE or DELETE to be sent to the worker of `tablet_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabletSnapshotOperation {
    pub tablet_id: TabletId,
    pub snapshot_id: SnapshotId,
    pub schedule_id: Option<ScheduleId>,
    pub snapshot_time: HybridTime,
    /// Initial phase the operation drives the tablet out of.
    pub phase: TabletPhase,
}

impl TabletSnapshotOperation {
    pub fn to_request(&self) -> TabletRequest {
        match self.phase {
            TabletPhase::Deleting => TabletRequest::DeleteOnTablet {
                snapshot_id: self.snapshot_id,
            },
            _ => TabletRequest::CreateOnTablet {
                snapshot_id: self.snapshot_id,
                schedule_id: self.schedule_id,
                snapshot_time: self.snapshot_time,
            },
        }
    }
}

/// Externally visible view of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub id: SnapshotId,
    pub state: TabletPhase,
    pub schedule_id: Option<ScheduleId>,
    pub snapshot_time: HybridTime,
    pub previous_snapshot_time: Option<HybridTime>,
    pub imported: bool,
    pub tablets: Vec<TabletEntry>,
    pub entries: Vec<CatalogEntry>,
}

#[derive(Debug, Clone)]
pub struct SnapshotState {
    id: SnapshotId,
    schedule_id: Option<ScheduleId>,
    previous_snapshot_time: Option<HybridTime>,
    snapshot_time: HybridTime,
    imported: bool,
    entries: Vec<CatalogEntry>,
    version: u32,
    /// Set by the leader between accepting a delete and seeing it applied.
    delete_started: bool,
    /// Leader only: every tablet finished but the result is not yet written.
    needs_update: bool,
    tablets: StateWithTablets,
}

impl SnapshotState {
    pub fn new(
        data: &CreateSnapshotData,
        now: HybridTime,
    ) -> Self {
        let mut tablets = StateWithTablets::new(TabletPhase::Creating, is_snapshot_terminal_failure);
        tablets.init(data.tablet_ids.iter().cloned(), now);
        Self {
            id: data.snapshot_id,
            schedule_id: data.schedule_id,
            previous_snapshot_time: data.previous_snapshot_time,
            snapshot_time: data.snapshot_time,
            imported: data.imported,
            entries: data.entries.clone(),
            version: 0,
            delete_started: false,
            needs_update: false,
            tablets,
        }
    }

    pub fn from_record(
        id: SnapshotId,
        record: SnapshotRecord,
        now: HybridTime,
    ) -> Self {
        let mut tablets = StateWithTablets::new(record.initial_phase, is_snapshot_terminal_failure);
        tablets.init_tablets(&record.tablets, now);
        Self {
            id,
            schedule_id: record.schedule_id,
            previous_snapshot_time: record.previous_snapshot_time,
            snapshot_time: record.snapshot_time,
            imported: record.imported,
            entries: record.entries,
            version: record.version,
            delete_started: false,
            needs_update: false,
            tablets,
        }
    }

    pub fn id(&self) -> SnapshotId {
        self.id
    }

    pub fn schedule_id(&self) -> Option<ScheduleId> {
        self.schedule_id
    }

    pub fn snapshot_time(&self) -> HybridTime {
        self.snapshot_time
    }

    pub fn previous_snapshot_time(&self) -> Option<HybridTime> {
        self.previous_snapshot_time
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn initial_phase(&self) -> TabletPhase {
        self.tablets.initial_phase()
    }

    pub fn tablets(&self) -> &StateWithTablets {
        &self.tablets
    }

    pub fn aggregated(&self) -> Result<TabletPhase> {
        self.tablets.aggregated()
    }

    pub fn all_tablets_done(&self) -> bool {
        self.tablets.all_done()
    }

    /// True once a delete has been requested or applied.
    pub fn is_deleting(&self) -> bool {
        self.delete_started || self.tablets.initial_phase() == TabletPhase::Deleting
    }

    pub fn to_record(&self) -> SnapshotRecord {
        SnapshotRecord {
            initial_phase: self.tablets.initial_phase(),
            tablets: self.tablets.to_entries(),
            snapshot_time: self.snapshot_time,
            previous_snapshot_time: self.previous_snapshot_time,
            schedule_id: self.schedule_id,
            imported: self.imported,
            entries: self.entries.clone(),
            version: self.version,
        }
    }

    /// Appends the current state to `batch` under a new version.
    pub fn store_to_batch(
        &mut self,
        batch: &mut WriteBatch,
    ) -> Result<()> {
        self.version += 1;
        batch.put(EntityType::Snapshot, self.id.as_bytes(), &self.to_record())
    }

    /// Only strictly newer versions replace the in-memory state.
    pub fn should_update(
        &self,
        other: &SnapshotRecord,
    ) -> bool {
        other.version > self.version
    }

    pub fn set_initial_phase(
        &mut self,
        phase: TabletPhase,
        now: HybridTime,
    ) {
        self.tablets.set_initial_phase(phase, now);
    }

    pub fn prepare_operations(
        &mut self,
        out: &mut Vec<TabletSnapshotOperation>,
    ) {
        let snapshot_id = self.id;
        let schedule_id = self.schedule_id;
        let snapshot_time = self.snapshot_time;
        let phase = self.tablets.initial_phase();
        self.tablets.prepare(|tablet_id| {
            out.push(TabletSnapshotOperation {
                tablet_id: tablet_id.clone(),
                snapshot_id,
                schedule_id,
                snapshot_time,
                phase,
            });
        });
    }

    /// Records a worker reply for an operation issued in `phase`. Replies for
    /// a phase the snapshot already left only release the tablet.
    pub fn done(
        &mut self,
        tablet_id: &TabletId,
        phase: TabletPhase,
        result: std::result::Result<(), tonic::Status>,
        now: HybridTime,
    ) {
        if phase != self.tablets.initial_phase() {
            debug!(
                "snapshot {}: stale {} reply for {}, now {}",
                self.id,
                phase,
                tablet_id,
                self.tablets.initial_phase()
            );
        }
        let result = match result {
            // The tablet is gone, so is its snapshot.
            Err(status) if phase == TabletPhase::Deleting && status.code() == Code::NotFound => Ok(()),
            other => other,
        };
        self.tablets.done(tablet_id, result, now);
    }

    /// Accepts a delete request, rejecting snapshots still being created or
    /// already on their way out.
    pub fn try_start_delete(&mut self) -> Result<()> {
        if self.tablets.initial_phase() == TabletPhase::Deleting {
            let what = if self.tablets.all_done() { "deleted" } else { "deleting" };
            return Err(SnapshotError::IllegalState(format!("snapshot {} is already {}", self.id, what)).into());
        }
        if self.delete_started {
            return Err(SnapshotError::IllegalState(format!("delete of snapshot {} already started", self.id)).into());
        }
        if self.aggregated()? == TabletPhase::Creating {
            return Err(SnapshotError::IllegalState(format!("snapshot {} is being created", self.id)).into());
        }
        self.delete_started = true;
        Ok(())
    }

    pub fn delete_aborted(&mut self) {
        self.delete_started = false;
    }

    /// Drops the running mark of a tablet whose reply belongs to another term.
    pub fn release(
        &mut self,
        tablet_id: &TabletId,
    ) {
        self.tablets.release(tablet_id);
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    pub fn set_needs_update(
        &mut self,
        needs_update: bool,
    ) {
        self.needs_update = needs_update;
    }

    /// True once the delete finished on every tablet at least `delay` ago.
    pub fn need_cleanup(
        &self,
        delay: Duration,
        now: HybridTime,
    ) -> bool {
        self.tablets.initial_phase() == TabletPhase::Deleting && self.tablets.passed_since_completion(delay, now)
    }

    pub fn any_failure(&self) -> Result<()> {
        match self.tablets.any_failure() {
            Some(status) => Err(status.into()),
            None => Ok(()),
        }
    }

    pub fn to_info(&self) -> SnapshotInfo {
        SnapshotInfo {
            id: self.id,
            state: self.aggregated().unwrap_or(TabletPhase::Failed),
            schedule_id: self.schedule_id,
            snapshot_time: self.snapshot_time,
            previous_snapshot_time: self.previous_snapshot_time,
            imported: self.imported,
            tablets: self.tablets.to_entries(),
            entries: self.entries.clone(),
        }
    }
}
