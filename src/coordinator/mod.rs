//! Snapshot coordinator.
//!
//! Owns every snapshot, restoration and schedule, serves user requests,
//! applies committed log entries and drives the periodic tick. All state
//! lives behind one mutex that is never held across an `.await`: public
//! entry points validate under the mutex, release it, then submit to the
//! replicator and wait for commit.

mod apply;
mod heartbeat;
mod poll;
mod restore;
mod snapshot_index;
mod tablet_ops;

pub use heartbeat::*;
pub(crate) use snapshot_index::*;


use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Weak;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::alias::CLOF;
use crate::alias::COF;
use crate::alias::FOF;
use crate::alias::ROF;
use crate::wait_committed;
use crate::CatalogEntry;
use crate::CatalogStore;
use crate::Clock;
use crate::CommitReceiver;
use crate::CoordinatorConfig;
use crate::CreateSnapshotData;
use crate::EntityType;
use crate::Error;
use crate::HybridTime;
use crate::LogApplier;
use crate::LogEntry;
use crate::Replicator;
use crate::RestorationId;
use crate::RestorationInfo;
use crate::RestorationState;
use crate::Result;
use crate::ScheduleId;
use crate::ScheduleInfo;
use crate::ScheduleOptions;
use crate::ScheduleRestoration;
use crate::ScheduleState;
use crate::SnapshotError;
use crate::SnapshotId;
use crate::SnapshotInfo;
use crate::SnapshotScheduleOperation;
use crate::TabletPhase;
use crate::TypeConfig;
use crate::WriteBatch;
use crate::REPLICATOR_WRITES_TOTAL;

/// Everything guarded by the coordinator mutex.
#[derive(Debug, Default)]
pub(crate) struct CoordinatorState {
    pub(crate) snapshots: SnapshotIndex,
    pub(crate) restorations: BTreeMap<RestorationId, RestorationState>,
    pub(crate) schedules: BTreeMap<ScheduleId, ScheduleState>,
    /// Advertised to workers; bumped whenever a restoration completes.
    pub(crate) last_restorations_update: HybridTime,
    /// PITR restorations waiting for the restored catalog to load.
    pub(crate) postponed_restores: Vec<ScheduleRestoration>,
}

impl CoordinatorState {
    /// True while a restoration from `snapshot_id` has not completed.
    pub(crate) fn is_restoring_from(
        &self,
        snapshot_id: SnapshotId,
    ) -> bool {
        self.restorations
            .values()
            .any(|r| r.snapshot_id() == snapshot_id && !r.is_finished())
    }

    pub(crate) fn snapshot_not_found(snapshot_id: SnapshotId) -> Error {
        SnapshotError::NotFound {
            entity: "snapshot",
            id: snapshot_id.to_string(),
        }
        .into()
    }

    pub(crate) fn schedule_not_found(schedule_id: ScheduleId) -> Error {
        SnapshotError::NotFound {
            entity: "snapshot schedule",
            id: schedule_id.to_string(),
        }
        .into()
    }
}

pub(crate) struct CoordinatorInner<T>
where T: TypeConfig
{
    pub(crate) config: CoordinatorConfig,
    pub(crate) replicator: Arc<ROF<T>>,
    pub(crate) fleet: Arc<FOF<T>>,
    pub(crate) catalog: Arc<COF<T>>,
    pub(crate) clock: Arc<CLOF<T>>,
    pub(crate) state: Mutex<CoordinatorState>,
    /// Lets apply hooks hand leader side effects to spawned tasks.
    weak_self: Weak<CoordinatorInner<T>>,
}

impl<T> CoordinatorInner<T>
where T: TypeConfig
{
    pub(crate) fn now(&self) -> HybridTime {
        self.clock.now()
    }

    pub(crate) fn arc(&self) -> Option<Arc<Self>> {
        self.weak_self.upgrade()
    }

    fn write_deadline(&self) -> Instant {
        Instant::now() + self.config.sys_catalog_write_timeout()
    }

    /// Runs `f` on the current runtime. Apply hooks may be invoked outside
    /// one, in which case leader side effects are dropped.
    pub(crate) fn spawn<F>(
        &self,
        what: &'static str,
        f: F,
    ) where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(f);
            }
            Err(e) => warn!("no runtime to run {}: {}", what, e),
        }
    }

    /// Waits for a write nobody else waits for, bounded by the catalog write
    /// timeout, and hands failures to `on_error`.
    pub(crate) fn watch_write<F>(
        &self,
        what: String,
        commit: CommitReceiver,
        on_error: F,
    ) where
        F: FnOnce(&Self, Error) + Send + 'static,
    {
        let Some(this) = self.arc() else {
            return;
        };
        let deadline = self.write_deadline();
        self.spawn("replicated write", async move {
            match wait_committed(commit, deadline).await {
                Ok(()) => {
                    REPLICATOR_WRITES_TOTAL.with_label_values(&["ok"]).inc();
                    debug!("{} committed", what);
                }
                Err(e) => {
                    REPLICATOR_WRITES_TOTAL.with_label_values(&["error"]).inc();
                    warn!("{} failed: {}", what, e);
                    on_error(&*this, e);
                }
            }
        });
    }

    pub(crate) fn submit_write(
        &self,
        what: String,
        batch: WriteBatch,
        leader_term: i64,
    ) {
        let commit = self.replicator.submit(LogEntry::WriteBatch(batch), leader_term);
        self.watch_write(what, commit, |_, _| {});
    }

    /// Tombstones the record of `id`.
    pub(crate) fn delete_entry(
        &self,
        entity_type: EntityType,
        id: &[u8; 16],
        leader_term: i64,
    ) {
        let mut batch = WriteBatch::new();
        batch.tombstone(entity_type, id);
        self.submit_write(format!("tombstone {:?}", entity_type), batch, leader_term);
    }

    /// Starts a delete the tick decided on, reverting the mark if the log entry
    /// does not commit.
    pub(crate) fn submit_delete(
        &self,
        snapshot_id: SnapshotId,
        leader_term: i64,
    ) {
        let commit = self
            .replicator
            .submit(LogEntry::DeleteSnapshot { snapshot_id }, leader_term);
        self.watch_write(format!("delete snapshot {}", snapshot_id), commit, move |inner, _| {
            inner.delete_aborted(snapshot_id);
        });
    }

    pub(crate) fn delete_aborted(
        &self,
        snapshot_id: SnapshotId,
    ) {
        if let Some(snapshot) = self.state.lock().snapshots.get_mut(&snapshot_id) {
            snapshot.delete_aborted();
        }
    }

    /// Drafts the CREATE entry for a schedule operation and submits it.
    pub(crate) fn submit_schedule_snapshot(
        &self,
        operation: &SnapshotScheduleOperation,
        leader_term: i64,
    ) -> Result<CommitReceiver> {
        let entries = self.catalog.collect_entries(&operation.filter)?;
        let tablet_ids = tablet_ids_of(&entries);
        if tablet_ids.is_empty() {
            return Err(SnapshotError::IllegalState(format!(
                "schedule {} does not cover any tablet",
                operation.schedule_id
            ))
            .into());
        }

        let mut snapshot_time = self.now();
        if let Some(previous) = operation.previous_snapshot_time {
            if snapshot_time <= previous {
                snapshot_time = HybridTime::from_micros(previous.as_micros() + 1);
            }
        }
        let data = CreateSnapshotData {
            snapshot_id: operation.snapshot_id,
            schedule_id: Some(operation.schedule_id),
            previous_snapshot_time: operation.previous_snapshot_time,
            snapshot_time,
            tablet_ids,
            imported: false,
            entries,
        };
        Ok(self.replicator.submit(LogEntry::CreateSnapshot(data), leader_term))
    }

    /// Tick path of a scheduled creation: fire and forget, retried by the
    /// next tick if it does not commit.
    pub(crate) fn execute_schedule_operation(
        &self,
        operation: SnapshotScheduleOperation,
        leader_term: i64,
    ) {
        let schedule_id = operation.schedule_id;
        let snapshot_id = operation.snapshot_id;
        match self.submit_schedule_snapshot(&operation, leader_term) {
            Ok(commit) => self.watch_write(
                format!("create snapshot {} for schedule {}", snapshot_id, schedule_id),
                commit,
                move |inner, e| inner.create_snapshot_aborted(schedule_id, snapshot_id, &e),
            ),
            Err(e) => {
                warn!("failed to execute operation on {}: {}", schedule_id, e);
                self.create_snapshot_aborted(schedule_id, snapshot_id, &e);
            }
        }
    }

    pub(crate) fn create_snapshot_aborted(
        &self,
        schedule_id: ScheduleId,
        snapshot_id: SnapshotId,
        error: &Error,
    ) {
        let mut state = self.state.lock();
        if state.snapshots.contains(&snapshot_id) {
            // Committed after all; the schedule finishes with the snapshot.
            return;
        }
        if let Some(schedule) = state.schedules.get_mut(&schedule_id) {
            let result = Err(SnapshotError::IllegalState(error.to_string()).into());
            schedule.snapshot_finished(snapshot_id, &result);
        }
    }
}

pub(crate) fn tablet_ids_of(entries: &[CatalogEntry]) -> Vec<crate::TabletId> {
    entries
        .iter()
        .filter(|e| e.entity_type == EntityType::Tablet)
        .map(|e| e.id.clone())
        .collect()
}

struct Poller {
    shutdown_tx: watch::Sender<()>,
    handle: JoinHandle<()>,
}

/// Coordinates snapshots, schedules and restorations of one cluster.
pub struct SnapshotCoordinator<T>
where T: TypeConfig
{
    inner: Arc<CoordinatorInner<T>>,
    poller: Mutex<Option<Poller>>,
}

impl<T> SnapshotCoordinator<T>
where T: TypeConfig
{
    pub fn new(
        config: CoordinatorConfig,
        replicator: Arc<ROF<T>>,
        fleet: Arc<FOF<T>>,
        catalog: Arc<COF<T>>,
        clock: Arc<CLOF<T>>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak_self| CoordinatorInner {
            config,
            replicator,
            fleet,
            catalog,
            clock,
            state: Mutex::new(CoordinatorState::default()),
            weak_self: weak_self.clone(),
        });
        Self {
            inner,
            poller: Mutex::new(None),
        }
    }

    /// Handle the replicator delivers committed entries to.
    pub fn log_applier(&self) -> Weak<dyn LogApplier> {
        let weak: Weak<CoordinatorInner<T>> = Arc::downgrade(&self.inner);
        weak
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Rebuilds the snapshot and schedule indices from the catalog store.
    pub fn load(&self) -> Result<()> {
        let snapshots = self.inner.load_records(EntityType::Snapshot)?;
        let schedules = self.inner.load_records(EntityType::SnapshotSchedule)?;
        info!("loaded {} snapshots and {} schedules", snapshots, schedules);
        Ok(())
    }

    /// Starts the periodic tick.
    pub fn start(&self) {
        let mut poller = self.poller.lock();
        if poller.is_some() {
            return;
        }
        self.inner.state.lock().last_restorations_update = self.inner.now();

        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let handle = tokio::spawn(poll::run_poller(self.inner.clone(), shutdown_rx));
        *poller = Some(Poller { shutdown_tx, handle });
        info!("snapshot coordinator started");
    }

    /// Stops the tick and waits for it to exit.
    pub async fn shutdown(&self) {
        let poller = self.poller.lock().take();
        if let Some(Poller { shutdown_tx, handle }) = poller {
            let _ = shutdown_tx.send(());
            if let Err(e) = handle.await {
                warn!("poller exited abnormally: {}", e);
            }
            info!("snapshot coordinator stopped");
        }
    }

    /// Runs one tick immediately.
    pub fn poll(&self) {
        self.inner.poll();
    }

    #[instrument(skip(self, entries))]
    pub async fn create(
        &self,
        entries: Vec<CatalogEntry>,
        imported: bool,
        leader_term: i64,
        deadline: Instant,
    ) -> Result<SnapshotId> {
        let tablet_ids = tablet_ids_of(&entries);
        if tablet_ids.is_empty() && !imported {
            return Err(SnapshotError::IllegalState("snapshot does not cover any tablet".into()).into());
        }

        let data = CreateSnapshotData {
            snapshot_id: SnapshotId::generate_random(),
            schedule_id: None,
            previous_snapshot_time: None,
            snapshot_time: self.inner.now(),
            tablet_ids,
            imported,
            entries,
        };
        let snapshot_id = data.snapshot_id;
        info!("create snapshot {} over {} tablets", snapshot_id, data.tablet_ids.len());

        let commit = self.inner.replicator.submit(LogEntry::CreateSnapshot(data), leader_term);
        wait_committed(commit, deadline).await?;
        Ok(snapshot_id)
    }

    /// Takes an out of band snapshot for a schedule.
    #[instrument(skip(self))]
    pub async fn create_for_schedule(
        &self,
        schedule_id: ScheduleId,
        leader_term: i64,
        deadline: Instant,
    ) -> Result<SnapshotId> {
        let operation = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let schedule = state
                .schedules
                .get_mut(&schedule_id)
                .ok_or_else(|| CoordinatorState::schedule_not_found(schedule_id))?;
            if schedule.deleted() {
                return Err(SnapshotError::IllegalState(format!("schedule {} is deleted", schedule_id)).into());
            }
            let last_snapshot_time = state
                .snapshots
                .bounding_live_snapshots(schedule_id)
                .map(|(_, last)| last.snapshot_time());
            schedule.force_create_snapshot(last_snapshot_time)?
        };
        let snapshot_id = operation.snapshot_id;
        info!("create snapshot {} for schedule {}", snapshot_id, schedule_id);

        let result = match self.inner.submit_schedule_snapshot(&operation, leader_term) {
            Ok(commit) => wait_committed(commit, deadline).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.inner.create_snapshot_aborted(schedule_id, snapshot_id, &e);
            return Err(e);
        }
        Ok(snapshot_id)
    }

    #[instrument(skip(self))]
    pub async fn delete(
        &self,
        snapshot_id: SnapshotId,
        leader_term: i64,
        deadline: Instant,
    ) -> Result<()> {
        {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            if state.is_restoring_from(snapshot_id) {
                return Err(SnapshotError::IllegalState(format!(
                    "snapshot {} is being restored",
                    snapshot_id
                ))
                .into());
            }
            let snapshot = state
                .snapshots
                .get_mut(&snapshot_id)
                .ok_or_else(|| CoordinatorState::snapshot_not_found(snapshot_id))?;
            snapshot.try_start_delete()?;
        }
        info!("delete snapshot {}", snapshot_id);

        let commit = self
            .inner
            .replicator
            .submit(LogEntry::DeleteSnapshot { snapshot_id }, leader_term);
        if let Err(e) = wait_committed(commit, deadline).await {
            self.inner.delete_aborted(snapshot_id);
            return Err(e);
        }
        Ok(())
    }

    /// Lists every snapshot when `snapshot_id` is nil, omitting deleted ones
    /// unless `list_deleted`; otherwise exactly the requested one.
    pub fn list_snapshots(
        &self,
        snapshot_id: SnapshotId,
        list_deleted: bool,
    ) -> Result<Vec<SnapshotInfo>> {
        let state = self.inner.state.lock();
        if !snapshot_id.is_nil() {
            let snapshot = state
                .snapshots
                .get(&snapshot_id)
                .ok_or_else(|| CoordinatorState::snapshot_not_found(snapshot_id))?;
            return Ok(vec![snapshot.to_info()]);
        }
        let mut snapshots: Vec<SnapshotInfo> = state
            .snapshots
            .values()
            .map(|s| s.to_info())
            .filter(|info| list_deleted || info.state != TabletPhase::Deleted)
            .collect();
        snapshots.sort_by_key(|info| (info.snapshot_time, info.id));
        Ok(snapshots)
    }

    /// Lists restorations, narrowed by either id when it is not nil.
    pub fn list_restorations(
        &self,
        restoration_id: RestorationId,
        snapshot_id: SnapshotId,
    ) -> Result<Vec<RestorationInfo>> {
        let state = self.inner.state.lock();
        if !restoration_id.is_nil() {
            let restoration = state
                .restorations
                .get(&restoration_id)
                .ok_or_else(|| SnapshotError::NotFound {
                    entity: "restoration",
                    id: restoration_id.to_string(),
                })?;
            return Ok(vec![restoration.to_info()]);
        }
        Ok(state
            .restorations
            .values()
            .filter(|r| snapshot_id.is_nil() || r.snapshot_id() == snapshot_id)
            .map(|r| r.to_info())
            .collect())
    }

    /// Lists schedules with their snapshots, oldest first.
    pub fn list_schedules(
        &self,
        schedule_id: ScheduleId,
    ) -> Result<Vec<ScheduleInfo>> {
        let state = self.inner.state.lock();
        let to_info = |schedule: &ScheduleState| ScheduleInfo {
            id: schedule.id(),
            options: schedule.options().clone(),
            snapshots: state
                .snapshots
                .schedule_snapshot_ids(schedule.id())
                .iter()
                .filter_map(|id| state.snapshots.get(id))
                .map(|s| s.to_info())
                .collect(),
        };
        if !schedule_id.is_nil() {
            let schedule = state
                .schedules
                .get(&schedule_id)
                .ok_or_else(|| CoordinatorState::schedule_not_found(schedule_id))?;
            return Ok(vec![to_info(schedule)]);
        }
        Ok(state.schedules.values().map(to_info).collect())
    }

    #[instrument(skip(self, options))]
    pub async fn create_schedule(
        &self,
        options: ScheduleOptions,
        leader_term: i64,
        deadline: Instant,
    ) -> Result<ScheduleId> {
        options.validate()?;
        if options.delete_time.is_some() {
            return Err(SnapshotError::InvalidArgument("new schedule cannot carry a delete time".into()).into());
        }
        let schedule = ScheduleState::new(ScheduleId::generate_random(), options);
        let mut batch = WriteBatch::new();
        schedule.store_to_batch(&mut batch)?;
        info!("create snapshot schedule {}", schedule.id());

        let commit = self.inner.replicator.submit(LogEntry::WriteBatch(batch), leader_term);
        wait_committed(commit, deadline).await?;
        Ok(schedule.id())
    }

    #[instrument(skip(self))]
    pub async fn delete_schedule(
        &self,
        schedule_id: ScheduleId,
        leader_term: i64,
        deadline: Instant,
    ) -> Result<()> {
        let batch = {
            let state = self.inner.state.lock();
            let schedule = state
                .schedules
                .get(&schedule_id)
                .ok_or_else(|| CoordinatorState::schedule_not_found(schedule_id))?;
            let mut options = schedule.options().clone();
            options.delete_time = Some(self.inner.now());
            let mut batch = WriteBatch::new();
            ScheduleState::new(schedule_id, options).store_to_batch(&mut batch)?;
            batch
        };
        info!("delete snapshot schedule {}", schedule_id);

        let commit = self.inner.replicator.submit(LogEntry::WriteBatch(batch), leader_term);
        wait_committed(commit, deadline).await
    }

    /// Restores `snapshot_id` as of `restore_at`. Schedule-linked snapshots
    /// first restore the catalog; the tablets follow once it is reloaded.
    #[instrument(skip(self))]
    pub async fn restore(
        &self,
        snapshot_id: SnapshotId,
        restore_at: HybridTime,
        leader_term: i64,
    ) -> Result<RestorationId> {
        self.inner.restore(snapshot_id, restore_at, leader_term).await
    }

    /// Resumes postponed restorations of `term` once the restored catalog loaded.
    pub fn sys_catalog_loaded(
        &self,
        term: i64,
    ) {
        self.inner.sys_catalog_loaded(term);
    }

    /// Number of restorations parked between catalog and tablet phases.
    pub fn postponed_restores_len(&self) -> usize {
        self.inner.state.lock().postponed_restores.len()
    }
}

impl<T> LogApplier for SnapshotCoordinator<T>
where T: TypeConfig
{
    fn apply(
        &self,
        leader_term: i64,
        entry: &LogEntry,
    ) -> Result<()> {
        self.inner.apply(leader_term, entry)
    }
}

impl<T> Drop for SnapshotCoordinator<T>
where T: TypeConfig
{
    fn drop(&mut self) {
        if let Some(Poller { shutdown_tx, handle }) = self.poller.get_mut().take() {
            let _ = shutdown_tx.send(());
            handle.abort();
        }
    }
}
