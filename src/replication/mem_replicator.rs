use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::sync::Weak;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::CommitReceiver;
use super::LogApplier;
use super::LogEntry;
use super::Replicator;
use crate::ReplicationError;
use crate::Result;
use crate::UNKNOWN_TERM;

struct PendingEntry {
    entry: LogEntry,
    leader_term: i64,
    commit: oneshot::Sender<Result<()>>,
}

#[derive(Default)]
struct ReplicatorState {
    applier: Option<Weak<dyn LogApplier>>,
    /// Committed entries in log order.
    log: Vec<LogEntry>,
    /// Submitted entries waiting for [`MemReplicator::release`].
    pending: Vec<PendingEntry>,
    hold: bool,
}

/// Single node replicator
///
/// Commits and applies an entry inside `submit`, so commit order is
/// submission order. `hold` parks submissions to simulate a slow quorum. The
/// committed log can be replayed into another applier as a follower would.
pub struct MemReplicator {
    leader_term: AtomicI64,
    state: Mutex<ReplicatorState>,
}

impl std::fmt::Debug for MemReplicator {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemReplicator")
            .field("leader_term", &self.leader_term.load(Ordering::SeqCst))
            .field("log_len", &state.log.len())
            .field("pending", &state.pending.len())
            .field("hold", &state.hold)
            .finish()
    }
}

impl MemReplicator {
    pub fn new(leader_term: i64) -> Self {
        Self {
            leader_term: AtomicI64::new(leader_term),
            state: Mutex::new(ReplicatorState::default()),
        }
    }

    /// Registers the consumer of committed entries.
    pub fn set_applier(
        &self,
        applier: Weak<dyn LogApplier>,
    ) {
        self.state.lock().applier = Some(applier);
    }

    pub fn set_leader_term(
        &self,
        term: i64,
    ) {
        self.leader_term.store(term, Ordering::SeqCst);
    }

    /// Parks every following submission until [`Self::release`].
    pub fn hold(&self) {
        self.state.lock().hold = true;
    }

    /// Commits parked submissions in order and stops parking.
    pub fn release(&self) {
        let pending = {
            let mut state = self.state.lock();
            state.hold = false;
            std::mem::take(&mut state.pending)
        };
        for pending in pending {
            self.commit(pending);
        }
    }

    pub fn log(&self) -> Vec<LogEntry> {
        self.state.lock().log.clone()
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Applies the committed log to `applier` the way a follower replays it.
    pub fn replay_into(
        &self,
        applier: &dyn LogApplier,
    ) -> Result<()> {
        for entry in self.log() {
            applier.apply(UNKNOWN_TERM, &entry)?;
        }
        Ok(())
    }

    fn commit(
        &self,
        pending: PendingEntry,
    ) {
        let PendingEntry {
            entry,
            leader_term,
            commit,
        } = pending;

        let current = self.leader_term.load(Ordering::SeqCst);
        if leader_term != current {
            debug!(
                "reject {} submitted in term {}, current term {}",
                entry.name(),
                leader_term,
                current
            );
            let _ = commit.send(Err(ReplicationError::NotLeader { term: current }.into()));
            return;
        }

        let applier = {
            let mut state = self.state.lock();
            state.log.push(entry.clone());
            state.applier.as_ref().and_then(Weak::upgrade)
        };
        trace!("committed {} in term {}", entry.name(), leader_term);

        let result = match applier {
            Some(applier) => applier.apply(leader_term, &entry),
            None => {
                warn!("no applier registered, {} committed without apply", entry.name());
                Ok(())
            }
        };
        if commit.send(result).is_err() {
            trace!("submitter of {} stopped waiting", entry.name());
        }
    }
}

impl Replicator for MemReplicator {
    fn submit(
        &self,
        entry: LogEntry,
        leader_term: i64,
    ) -> CommitReceiver {
        let (tx, rx) = oneshot::channel();
        let pending = PendingEntry {
            entry,
            leader_term,
            commit: tx,
        };
        {
            let mut state = self.state.lock();
            if state.hold {
                state.pending.push(pending);
                return rx;
            }
        }
        self.commit(pending);
        rx
    }

    fn leader_term(&self) -> i64 {
        self.leader_term.load(Ordering::SeqCst)
    }
}
