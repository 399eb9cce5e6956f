use std::collections::BTreeSet;

use tonic::Code;

use super::StateWithTablets;
use super::TabletEntry;
use super::TabletPhase;
use crate::HybridTime;
use crate::RestorationId;
use crate::Result;
use crate::ScheduleId;
use crate::SnapshotId;
use crate::TabletId;

/// Worker errors after which retrying a tablet restore is pointless.
pub fn is_restoration_terminal_failure(status: &tonic::Status) -> bool {
    matches!(status.code(), Code::Aborted | Code::InvalidArgument)
}

/// One RESTORE_ON_TABLET to be sent to the worker of `tablet_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabletRestoreOperation {
    pub tablet_id: TabletId,
    pub restoration_id: RestorationId,
    /// Nil when the tablet did not exist at snapshot time.
    pub snapshot_id: SnapshotId,
    pub restore_at: HybridTime,
    pub send_metadata: bool,
}

/// Externally visible view of a restoration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestorationInfo {
    pub id: RestorationId,
    pub snapshot_id: SnapshotId,
    pub schedule_id: Option<ScheduleId>,
    pub restore_at: HybridTime,
    pub state: TabletPhase,
    pub tablets: Vec<TabletEntry>,
    pub complete_time: Option<HybridTime>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RestorationState {
    id: RestorationId,
    snapshot_id: SnapshotId,
    schedule_id: Option<ScheduleId>,
    restore_at: HybridTime,
    /// Tablets recorded by the source snapshot.
    snapshot_tablets: BTreeSet<TabletId>,
    send_metadata: bool,
    tablets_initialized: bool,
    complete_time: Option<HybridTime>,
    /// Set when the restoration can no longer make progress on this node.
    abandoned: Option<String>,
    tablets: StateWithTablets,
}

impl RestorationState {
    pub fn new<I>(
        id: RestorationId,
        snapshot_id: SnapshotId,
        schedule_id: Option<ScheduleId>,
        restore_at: HybridTime,
        snapshot_tablets: I,
    ) -> Self
    where
        I: IntoIterator<Item = TabletId>,
    {
        Self {
            id,
            snapshot_id,
            schedule_id,
            restore_at,
            snapshot_tablets: snapshot_tablets.into_iter().collect(),
            send_metadata: false,
            tablets_initialized: false,
            complete_time: None,
            abandoned: None,
            tablets: StateWithTablets::new(TabletPhase::Restoring, is_restoration_terminal_failure),
        }
    }

    pub fn id(&self) -> RestorationId {
        self.id
    }

    pub fn snapshot_id(&self) -> SnapshotId {
        self.snapshot_id
    }

    pub fn schedule_id(&self) -> Option<ScheduleId> {
        self.schedule_id
    }

    pub fn restore_at(&self) -> HybridTime {
        self.restore_at
    }

    pub fn complete_time(&self) -> Option<HybridTime> {
        self.complete_time
    }

    pub fn tablets(&self) -> &StateWithTablets {
        &self.tablets
    }

    /// Starts the tablet phase over the tablets the catalog reports now.
    pub fn init_tablet_ids<I>(
        &mut self,
        tablet_ids: I,
        send_metadata: bool,
        now: HybridTime,
    ) where
        I: IntoIterator<Item = TabletId>,
    {
        self.send_metadata = send_metadata;
        self.tablets_initialized = true;
        self.tablets.init(tablet_ids, now);
    }

    pub fn tablets_initialized(&self) -> bool {
        self.tablets_initialized
    }

    pub fn prepare_operations(
        &mut self,
        out: &mut Vec<TabletRestoreOperation>,
    ) {
        if !self.tablets_initialized || self.is_finished() {
            return;
        }
        let restoration_id = self.id;
        let snapshot_id = self.snapshot_id;
        let restore_at = self.restore_at;
        let send_metadata = self.send_metadata;
        let snapshot_tablets = &self.snapshot_tablets;
        self.tablets.prepare(|tablet_id| {
            let snapshot_id = if snapshot_tablets.contains(tablet_id) {
                snapshot_id
            } else {
                SnapshotId::nil()
            };
            out.push(TabletRestoreOperation {
                tablet_id: tablet_id.clone(),
                restoration_id,
                snapshot_id,
                restore_at,
                send_metadata,
            });
        });
    }

    pub fn done(
        &mut self,
        tablet_id: &TabletId,
        result: std::result::Result<(), tonic::Status>,
        now: HybridTime,
    ) {
        self.tablets.done(tablet_id, result, now);
    }

    pub fn release(
        &mut self,
        tablet_id: &TabletId,
    ) {
        self.tablets.release(tablet_id);
    }

    /// True when every tablet reached a terminal phase and completion was not yet recorded.
    pub fn ready_to_finish(&self) -> bool {
        self.tablets_initialized && self.complete_time.is_none() && self.abandoned.is_none() && self.tablets.all_done()
    }

    pub fn set_complete_time(
        &mut self,
        complete_time: HybridTime,
    ) {
        self.complete_time = Some(complete_time);
    }

    pub fn abandon(
        &mut self,
        reason: String,
    ) {
        self.abandoned = Some(reason);
    }

    pub fn is_finished(&self) -> bool {
        self.complete_time.is_some() || self.abandoned.is_some()
    }

    pub fn aggregated(&self) -> Result<TabletPhase> {
        if self.abandoned.is_some() {
            return Ok(TabletPhase::Failed);
        }
        if !self.tablets_initialized {
            return Ok(TabletPhase::Restoring);
        }
        self.tablets.aggregated()
    }

    pub fn to_info(&self) -> RestorationInfo {
        let error = self
            .abandoned
            .clone()
            .or_else(|| self.tablets.any_failure().map(|status| status.message().to_string()));
        RestorationInfo {
            id: self.id,
            snapshot_id: self.snapshot_id,
            schedule_id: self.schedule_id,
            restore_at: self.restore_at,
            state: self.aggregated().unwrap_or(TabletPhase::Failed),
            tablets: self.tablets.to_entries(),
            complete_time: self.complete_time,
            error,
        }
    }
}
