//! Tablet RPC fan-out and reply handling.

use std::collections::HashMap;

use futures::future::join_all;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::CoordinatorInner;
use crate::CatalogStore;
use crate::HybridTime;
use crate::LogEntry;
use crate::Replicator;
use crate::RestorationId;
use crate::Result;
use crate::SnapshotId;
use crate::TabletFleet;
use crate::TabletId;
use crate::TabletPhase;
use crate::TabletRequest;
use crate::TabletRestoreOperation;
use crate::TabletSnapshotOperation;
use crate::TypeConfig;
use crate::WriteBatch;
use crate::TABLET_OPS_TOTAL;

type TabletReply = std::result::Result<(), tonic::Status>;

impl<T> CoordinatorInner<T>
where T: TypeConfig
{
    /// Sends every CREATE/DELETE; each reply is routed back into the snapshot.
    pub(crate) fn execute_operations(
        &self,
        operations: Vec<TabletSnapshotOperation>,
        leader_term: i64,
    ) {
        if operations.is_empty() {
            return;
        }
        let Some(this) = self.arc() else {
            return;
        };
        for operation in operations {
            let request = operation.to_request();
            TABLET_OPS_TOTAL.with_label_values(&[request.op_type().as_str()]).inc();
            debug!(
                "send {} of snapshot {} to {}",
                request.op_type().as_str(),
                operation.snapshot_id,
                operation.tablet_id
            );
            let this = this.clone();
            self.spawn("tablet snapshot operation", async move {
                let result = this.fleet.send(operation.tablet_id.clone(), request).await;
                this.tablet_snapshot_op_done(&operation, result, leader_term);
            });
        }
    }

    pub(crate) fn tablet_snapshot_op_done(
        &self,
        operation: &TabletSnapshotOperation,
        result: TabletReply,
        leader_term: i64,
    ) {
        let now = self.now();
        let current_term = self.replicator.leader_term();
        let finished = {
            let mut state = self.state.lock();
            let Some(snapshot) = state.snapshots.get_mut(&operation.snapshot_id) else {
                error!(
                    "reply from {} for unknown snapshot {}",
                    operation.tablet_id, operation.snapshot_id
                );
                return;
            };
            if current_term != leader_term {
                debug!(
                    "drop reply from {} for snapshot {}: sent in term {}, now {}",
                    operation.tablet_id, operation.snapshot_id, leader_term, current_term
                );
                snapshot.release(&operation.tablet_id);
                return;
            }
            let was_done = snapshot.all_tablets_done();
            snapshot.done(&operation.tablet_id, operation.phase, result, now);
            let finished = !was_done && snapshot.all_tablets_done();
            if finished {
                snapshot.set_needs_update(true);
            }
            finished
        };
        if finished {
            self.update_snapshot_if_done(operation.snapshot_id, leader_term);
        }
    }

    /// Persists a snapshot whose tablets all left the initial phase, and ends
    /// the schedule's in-flight creation if this was it.
    ///
    /// Runs only while the snapshot is flagged; a write that does not commit
    /// flags it again for the next tick.
    pub(crate) fn update_snapshot_if_done(
        &self,
        snapshot_id: SnapshotId,
        leader_term: i64,
    ) {
        if self.replicator.leader_term() != leader_term {
            debug!("term {} is over, leave snapshot {} to the next tick", leader_term, snapshot_id);
            return;
        }
        let batch = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(snapshot) = state.snapshots.get_mut(&snapshot_id) else {
                return;
            };
            if !snapshot.needs_update() || !snapshot.all_tablets_done() {
                return;
            }
            snapshot.set_needs_update(false);
            if snapshot.initial_phase() == TabletPhase::Creating {
                if let Some(schedule_id) = snapshot.schedule_id() {
                    let result = snapshot.any_failure();
                    if let Some(schedule) = state.schedules.get_mut(&schedule_id) {
                        schedule.snapshot_finished(snapshot_id, &result);
                    }
                }
            }
            let mut batch = WriteBatch::new();
            if let Err(e) = snapshot.store_to_batch(&mut batch) {
                error!("failed to encode snapshot {}: {}", snapshot_id, e);
                return;
            }
            info!(
                "snapshot {} finished {}: {:?}",
                snapshot_id,
                snapshot.initial_phase(),
                snapshot.aggregated().ok()
            );
            batch
        };
        let commit = self.replicator.submit(LogEntry::WriteBatch(batch), leader_term);
        self.watch_write(format!("update snapshot {}", snapshot_id), commit, move |inner, _| {
            inner.update_aborted(snapshot_id);
        });
    }

    fn update_aborted(
        &self,
        snapshot_id: SnapshotId,
    ) {
        let mut state = self.state.lock();
        if let Some(snapshot) = state.snapshots.get_mut(&snapshot_id) {
            snapshot.set_needs_update(true);
        }
    }

    /// Sends every RESTORE_ON_TABLET of one tick or one restoration.
    ///
    /// Operations sending metadata carry the table schema the catalog knows
    /// for the tablet now.
    pub(crate) fn execute_restore_operations(
        &self,
        operations: Vec<TabletRestoreOperation>,
        leader_term: i64,
    ) {
        if operations.is_empty() {
            return;
        }
        let Some(this) = self.arc() else {
            return;
        };
        let metadata_tablets: Vec<_> = operations
            .iter()
            .filter(|op| op.send_metadata)
            .map(|op| op.tablet_id.clone())
            .collect();
        let infos = if metadata_tablets.is_empty() {
            Vec::new()
        } else {
            self.catalog.tablet_infos(&metadata_tablets)
        };
        let schemas: HashMap<_, _> = metadata_tablets.into_iter().zip(infos).collect();

        let mut sends = Vec::with_capacity(operations.len());
        for operation in operations {
            let table_schema = if operation.send_metadata {
                match schemas.get(&operation.tablet_id).cloned().flatten() {
                    Some(info) => Some(info.table.schema),
                    None => {
                        warn!(
                            "restoration {}: no table metadata for {}",
                            operation.restoration_id, operation.tablet_id
                        );
                        None
                    }
                }
            } else {
                None
            };
            let request = TabletRequest::RestoreOnTablet {
                snapshot_id: operation.snapshot_id,
                restore_at: operation.restore_at,
                restoration_id: operation.restoration_id,
                send_metadata: operation.send_metadata,
                table_schema,
            };
            TABLET_OPS_TOTAL.with_label_values(&[request.op_type().as_str()]).inc();
            debug!(
                "send restore {} to {} (snapshot {})",
                operation.restoration_id, operation.tablet_id, operation.snapshot_id
            );
            let fleet = this.fleet.clone();
            sends.push(async move {
                let result = fleet.send(operation.tablet_id.clone(), request).await;
                (operation, result)
            });
        }

        self.spawn("tablet restore operations", async move {
            for (operation, result) in join_all(sends).await {
                this.restoration_op_done(&operation, result, leader_term);
            }
        });
    }

    pub(crate) fn restoration_op_done(
        &self,
        operation: &TabletRestoreOperation,
        result: TabletReply,
        leader_term: i64,
    ) {
        let now = self.now();
        let current_term = self.replicator.leader_term();
        let finished = {
            let mut state = self.state.lock();
            let Some(restoration) = state.restorations.get_mut(&operation.restoration_id) else {
                error!(
                    "reply from {} for unknown restoration {}",
                    operation.tablet_id, operation.restoration_id
                );
                return;
            };
            if current_term != leader_term {
                debug!(
                    "drop restore reply from {} for {}: sent in term {}, now {}",
                    operation.tablet_id, operation.restoration_id, leader_term, current_term
                );
                restoration.release(&operation.tablet_id);
                return;
            }
            restoration.done(&operation.tablet_id, result, now);
            restoration.ready_to_finish()
        };
        if finished {
            self.finish_restoration(operation.restoration_id, leader_term);
        }
    }

    /// Records completion, then tells every restored tablet. Completion is
    /// advertised through the heartbeat before the first RESTORE_FINISHED
    /// leaves.
    pub(crate) fn finish_restoration(
        &self,
        restoration_id: RestorationId,
        leader_term: i64,
    ) {
        let complete_time = self.now();
        let tablets = {
            let mut state = self.state.lock();
            let Some(restoration) = state.restorations.get_mut(&restoration_id) else {
                return;
            };
            if !restoration.ready_to_finish() {
                return;
            }
            restoration.set_complete_time(complete_time);
            let tablets: Vec<_> = restoration
                .tablets()
                .tablet_ids()
                .filter(|id| restoration.tablets().tablet_phase(id) == Some(TabletPhase::Restored))
                .cloned()
                .collect();
            state.last_restorations_update = complete_time;
            tablets
        };
        info!("restoration {} completed at {}", restoration_id, complete_time);

        if self.config.skip_sending_restore_finished {
            return;
        }
        self.send_restore_finished(restoration_id, complete_time, tablets, leader_term);
    }

    fn send_restore_finished(
        &self,
        restoration_id: RestorationId,
        complete_time: HybridTime,
        tablets: Vec<TabletId>,
        leader_term: i64,
    ) {
        if tablets.is_empty() {
            return;
        }
        let Some(this) = self.arc() else {
            return;
        };
        self.spawn("restore finished", async move {
            let sends = tablets.into_iter().map(|tablet_id| {
                let request = TabletRequest::RestoreFinished {
                    restoration_id,
                    complete_time,
                };
                TABLET_OPS_TOTAL.with_label_values(&[request.op_type().as_str()]).inc();
                let fleet = this.fleet.clone();
                async move {
                    let result: Result<()> = fleet.send(tablet_id.clone(), request).await.map_err(Into::into);
                    (tablet_id, result)
                }
            });
            for (tablet_id, result) in join_all(sends).await {
                if let Err(e) = result {
                    warn!(
                        "restore finished of {} on {} in term {} failed: {}",
                        restoration_id, tablet_id, leader_term, e
                    );
                }
            }
        });
    }
}
