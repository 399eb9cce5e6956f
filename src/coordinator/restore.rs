//! Restore workflow.
//!
//! A restore from a schedule snapshot is a point-in-time restore: the catalog
//! is first reloaded as of `restore_at` through a RESTORE_SYS_CATALOG entry,
//! and the tablet phase waits in `postponed_restores` until the catalog
//! reports the reload loaded in the same term. Any other snapshot goes
//! straight to the tablet phase.

use tracing::debug;
use tracing::info;
use tracing::warn;

use super::CoordinatorInner;
use super::CoordinatorState;
use crate::wait_committed;
use crate::CatalogStore;
use crate::HybridTime;
use crate::LogEntry;
use crate::Replicator;
use crate::RestorationId;
use crate::RestorationState;
use crate::Result;
use crate::ScheduleRestoration;
use crate::SnapshotError;
use crate::SnapshotId;
use crate::TabletId;
use crate::TabletPhase;
use crate::TypeConfig;

impl<T> CoordinatorInner<T>
where T: TypeConfig
{
    pub(crate) async fn restore(
        &self,
        snapshot_id: SnapshotId,
        restore_at: HybridTime,
        leader_term: i64,
    ) -> Result<RestorationId> {
        let now = self.now();
        let (restoration_id, restore_at, is_pitr, snapshot_tablets) = {
            let mut state = self.state.lock();
            let snapshot = state
                .snapshots
                .get(&snapshot_id)
                .ok_or_else(|| CoordinatorState::snapshot_not_found(snapshot_id))?;
            let aggregated = snapshot.aggregated()?;
            if aggregated != TabletPhase::Complete {
                return Err(SnapshotError::SnapshotNotReady(format!(
                    "snapshot {} is {}",
                    snapshot_id, aggregated
                ))
                .into());
            }
            // MIN restores the snapshot as taken.
            let restore_at = if restore_at == HybridTime::MIN {
                snapshot.snapshot_time()
            } else {
                restore_at
            };
            if restore_at > now {
                return Err(SnapshotError::InvalidArgument(format!(
                    "restore time {} is in the future, now {}",
                    restore_at, now
                ))
                .into());
            }

            let restoration_id = RestorationId::generate_random();
            let snapshot_tablets: Vec<TabletId> = snapshot.tablets().tablet_ids().cloned().collect();
            let restoration = RestorationState::new(
                restoration_id,
                snapshot_id,
                snapshot.schedule_id(),
                restore_at,
                snapshot_tablets.iter().cloned(),
            );
            let is_pitr = snapshot.schedule_id().is_some();
            state.restorations.insert(restoration_id, restoration);
            state.last_restorations_update = now;
            (restoration_id, restore_at, is_pitr, snapshot_tablets)
        };
        info!(
            "restore snapshot {} at {} as {} (pitr: {})",
            snapshot_id, restore_at, restoration_id, is_pitr
        );

        if !is_pitr {
            self.do_restore(restoration_id, snapshot_tablets, false, leader_term);
            return Ok(restoration_id);
        }

        let commit = self.replicator.submit(
            LogEntry::RestoreSysCatalog {
                snapshot_id,
                restore_at,
                restoration_id,
            },
            leader_term,
        );
        if let Err(e) = wait_committed(commit, self.write_deadline()).await {
            warn!("restoration {}: catalog restore failed: {}", restoration_id, e);
            self.abandon_restoration(restoration_id, format!("catalog restore failed: {}", e));
            return Err(e);
        }
        Ok(restoration_id)
    }

    pub(crate) fn restore_sys_catalog_replicated(
        &self,
        leader_term: i64,
        snapshot_id: SnapshotId,
        restore_at: HybridTime,
        restoration_id: RestorationId,
    ) -> Result<()> {
        let filter = {
            let state = self.state.lock();
            let snapshot = state
                .snapshots
                .get(&snapshot_id)
                .ok_or_else(|| CoordinatorState::snapshot_not_found(snapshot_id))?;
            let schedule_id = snapshot.schedule_id().ok_or_else(|| {
                SnapshotError::IllegalState(format!("snapshot {} does not belong to a schedule", snapshot_id))
            })?;
            let schedule = state
                .schedules
                .get(&schedule_id)
                .ok_or_else(|| CoordinatorState::schedule_not_found(schedule_id))?;
            schedule.options().filter.clone()
        };

        let mut restoration = ScheduleRestoration {
            snapshot_id,
            restore_at,
            restoration_id,
            term: leader_term,
            filter,
            objects_to_restore: Default::default(),
            obsolete_tablets: Vec::new(),
            obsolete_tables: Vec::new(),
        };
        self.catalog.restore_sys_catalog(&mut restoration)?;
        info!(
            "restoration {}: catalog restored at {}, {} objects, {} obsolete tables",
            restoration_id,
            restore_at,
            restoration.objects_to_restore.len(),
            restoration.obsolete_tables.len()
        );

        if leader_term >= 0 {
            self.state.lock().postponed_restores.push(restoration);
        }
        Ok(())
    }

    /// Starts the tablet phase of the postponed restorations of `term`.
    /// Older ones belong to a previous leader and are abandoned.
    pub(crate) fn sys_catalog_loaded(
        &self,
        term: i64,
    ) {
        if term < 0 {
            return;
        }
        let ready = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let (ready, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut state.postponed_restores)
                .into_iter()
                .partition(|r| r.term == term);
            for restoration in rest {
                if restoration.term > term {
                    state.postponed_restores.push(restoration);
                    continue;
                }
                warn!(
                    "drop postponed restoration {} of term {}, catalog loaded in term {}",
                    restoration.restoration_id, restoration.term, term
                );
                if let Some(r) = state.restorations.get_mut(&restoration.restoration_id) {
                    r.abandon(format!(
                        "leader changed from term {} to {}",
                        restoration.term, term
                    ));
                }
            }
            ready
        };

        for restoration in ready {
            if let Err(e) = self.catalog.verify_restored_objects(&restoration) {
                warn!("restoration {}: verify failed: {}", restoration.restoration_id, e);
                self.abandon_restoration(restoration.restoration_id, e.to_string());
                continue;
            }
            self.do_restore(
                restoration.restoration_id,
                restoration.tablets_to_restore(),
                true,
                term,
            );
        }
    }

    /// Initializes the tablet phase and sends the first RESTORE_ON_TABLET round.
    pub(crate) fn do_restore(
        &self,
        restoration_id: RestorationId,
        tablet_ids: Vec<TabletId>,
        send_metadata: bool,
        leader_term: i64,
    ) {
        let now = self.now();
        let (operations, finished) = {
            let mut state = self.state.lock();
            let Some(restoration) = state.restorations.get_mut(&restoration_id) else {
                warn!("restoration {} vanished before its tablet phase", restoration_id);
                return;
            };
            restoration.init_tablet_ids(tablet_ids, send_metadata, now);
            let mut operations = Vec::new();
            restoration.prepare_operations(&mut operations);
            (operations, restoration.ready_to_finish())
        };
        debug!(
            "restoration {}: {} tablet operations, send metadata: {}",
            restoration_id,
            operations.len(),
            send_metadata
        );

        if finished {
            self.finish_restoration(restoration_id, leader_term);
            return;
        }
        self.execute_restore_operations(operations, leader_term);
    }

    pub(crate) fn abandon_restoration(
        &self,
        restoration_id: RestorationId,
        reason: String,
    ) {
        if let Some(restoration) = self.state.lock().restorations.get_mut(&restoration_id) {
            restoration.abandon(reason);
        }
    }
}
