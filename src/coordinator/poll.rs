//! Periodic tick.
//!
//! One pass decides under the mutex and acts outside it:
//! - tombstones deleted snapshots once `cleanup_delay` passed,
//! - re-sends CREATE/DELETE/RESTORE to idle tablets,
//! - writes finished snapshots whose earlier update did not commit,
//! - applies schedule retention and starts scheduled snapshots,
//! - drains deleted schedules, then tombstones them,
//! - lets the catalog collect hidden objects no schedule can restore.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::trace;

use super::CoordinatorInner;
use super::CoordinatorState;
use crate::CatalogStore;
use crate::EntityType;
use crate::HybridTime;
use crate::Replicator;
use crate::RestorationId;
use crate::ScheduleMinRestoreTime;
use crate::ScheduleOperationKind;
use crate::SnapshotId;
use crate::SnapshotScheduleOperation;
use crate::TabletRestoreOperation;
use crate::TabletSnapshotOperation;
use crate::TypeConfig;
use crate::POLL_DURATION_MS;
use crate::POLL_TOTAL;

/// Everything one tick decided to do.
#[derive(Debug, Default)]
pub(crate) struct PollPlan {
    pub(crate) cleanup_snapshots: Vec<SnapshotId>,
    /// Finished snapshots whose result still has to be written.
    pub(crate) update_snapshots: Vec<SnapshotId>,
    pub(crate) operations: Vec<TabletSnapshotOperation>,
    pub(crate) restore_operations: Vec<TabletRestoreOperation>,
    pub(crate) finished_restorations: Vec<RestorationId>,
    pub(crate) delete_snapshots: Vec<SnapshotId>,
    pub(crate) schedule_operations: Vec<SnapshotScheduleOperation>,
    pub(crate) schedule_min_restore_time: ScheduleMinRestoreTime,
}

pub(crate) async fn run_poller<T>(
    inner: Arc<CoordinatorInner<T>>,
    mut shutdown_signal: watch::Receiver<()>,
) where
    T: TypeConfig,
{
    let mut interval = tokio::time::interval(inner.config.poll_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;
    debug!("poll_interval: {:?}", inner.config.poll_interval());

    loop {
        tokio::select! {
            _ = shutdown_signal.changed() => {
                info!("[SnapshotCoordinator] poller shutdown signal received.");
                return;
            }

            _ = interval.tick() => {
                trace!("_ = interval.tick()");
                inner.poll();
            }
        }
    }
}

impl<T> CoordinatorInner<T>
where T: TypeConfig
{
    /// Runs one tick. Followers skip it.
    pub(crate) fn poll(&self) {
        let leader_term = self.replicator.leader_term();
        if leader_term < 0 {
            trace!("not leader, skip poll");
            return;
        }
        POLL_TOTAL.inc();
        let started = Instant::now();

        let plan = {
            let mut state = self.state.lock();
            self.plan_poll(&mut state, self.now())
        };
        POLL_DURATION_MS.observe(started.elapsed().as_secs_f64() * 1000.0);
        self.execute_poll(plan, leader_term);
    }

    pub(crate) fn plan_poll(
        &self,
        state: &mut CoordinatorState,
        now: HybridTime,
    ) -> PollPlan {
        let mut plan = PollPlan::default();
        let cleanup_delay = self.config.cleanup_delay();

        for snapshot in state.snapshots.values_mut() {
            if snapshot.need_cleanup(cleanup_delay, now) {
                plan.cleanup_snapshots.push(snapshot.id());
            } else if snapshot.needs_update() && snapshot.all_tablets_done() {
                plan.update_snapshots.push(snapshot.id());
            } else {
                snapshot.prepare_operations(&mut plan.operations);
            }
        }

        for restoration in state.restorations.values_mut() {
            if restoration.ready_to_finish() {
                plan.finished_restorations.push(restoration.id());
            } else {
                restoration.prepare_operations(&mut plan.restore_operations);
            }
        }

        self.plan_schedules(state, now, &mut plan);
        plan
    }

    fn plan_schedules(
        &self,
        state: &mut CoordinatorState,
        now: HybridTime,
        plan: &mut PollPlan,
    ) {
        let schedule_cleanup_delay = self.config.schedule_cleanup_delay();
        let restoring: BTreeSet<SnapshotId> = state
            .restorations
            .values()
            .filter(|r| !r.is_finished())
            .map(|r| r.snapshot_id())
            .collect();

        for schedule in state.schedules.values_mut() {
            let schedule_id = schedule.id();

            if schedule.deleted() {
                for snapshot_id in state.snapshots.schedule_snapshot_ids(schedule_id) {
                    if restoring.contains(&snapshot_id) {
                        continue;
                    }
                    if let Some(snapshot) = state.snapshots.get_mut(&snapshot_id) {
                        if !snapshot.is_deleting() && snapshot.try_start_delete().is_ok() {
                            debug!("schedule {} deleted, drop snapshot {}", schedule_id, snapshot_id);
                            plan.delete_snapshots.push(snapshot_id);
                        }
                    }
                }
                if !state.snapshots.has_schedule_snapshots(schedule_id) {
                    schedule.prepare_operations(None, now, schedule_cleanup_delay, &mut plan.schedule_operations);
                }
                continue;
            }

            let bounds = state
                .snapshots
                .bounding_live_snapshots(schedule_id)
                .map(|(first, last)| {
                    (
                        first.id(),
                        first.snapshot_time(),
                        first.previous_snapshot_time(),
                        last.id(),
                        last.snapshot_time(),
                    )
                });
            let mut last_snapshot_time = None;
            if let Some((first_id, first_time, first_previous, last_id, last_time)) = bounds {
                last_snapshot_time = Some(last_time);
                plan.schedule_min_restore_time
                    .insert(schedule_id, first_previous.unwrap_or(first_time));

                let expired = first_time < now.sub_duration(schedule.options().retention);
                if first_id != last_id && expired {
                    if restoring.contains(&first_id) {
                        debug!("keep snapshot {} of {}: restore in progress", first_id, schedule_id);
                    } else if let Some(first) = state.snapshots.get_mut(&first_id) {
                        match first.try_start_delete() {
                            Ok(()) => {
                                info!("retention of schedule {} drops snapshot {}", schedule_id, first_id);
                                plan.delete_snapshots.push(first_id);
                            }
                            Err(e) => debug!("keep snapshot {}: {}", first_id, e),
                        }
                    }
                }
            }

            schedule.prepare_operations(
                last_snapshot_time,
                now,
                schedule_cleanup_delay,
                &mut plan.schedule_operations,
            );
        }
    }

    fn execute_poll(
        &self,
        plan: PollPlan,
        leader_term: i64,
    ) {
        let PollPlan {
            cleanup_snapshots,
            update_snapshots,
            operations,
            restore_operations,
            finished_restorations,
            delete_snapshots,
            schedule_operations,
            schedule_min_restore_time,
        } = plan;

        for snapshot_id in cleanup_snapshots {
            debug!("cleanup snapshot {}", snapshot_id);
            self.delete_entry(EntityType::Snapshot, snapshot_id.as_bytes(), leader_term);
        }
        for snapshot_id in update_snapshots {
            self.update_snapshot_if_done(snapshot_id, leader_term);
        }
        self.execute_operations(operations, leader_term);
        self.execute_restore_operations(restore_operations, leader_term);
        for restoration_id in finished_restorations {
            self.finish_restoration(restoration_id, leader_term);
        }
        for snapshot_id in delete_snapshots {
            self.submit_delete(snapshot_id, leader_term);
        }
        for operation in schedule_operations {
            match operation.kind {
                ScheduleOperationKind::CreateSnapshot => self.execute_schedule_operation(operation, leader_term),
                ScheduleOperationKind::Cleanup => {
                    info!("cleanup snapshot schedule {}", operation.schedule_id);
                    self.delete_entry(
                        EntityType::SnapshotSchedule,
                        operation.schedule_id.as_bytes(),
                        leader_term,
                    );
                }
            }
        }
        self.catalog.cleanup_hidden_objects(&schedule_min_restore_time);
    }
}
