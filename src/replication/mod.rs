//! Replicated log contract.
//!
//! Every coordinator decision is drafted as a [`LogEntry`] and handed to the
//! [`Replicator`]. Once committed, the replicator calls [`LogApplier::apply`]
//! on every replica in log order: with the submitting term on the leader, and
//! with [`crate::UNKNOWN_TERM`] when a follower replays the log.

mod mem_replicator;

pub use mem_replicator::*;


#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::timeout_at;
use tokio::time::Instant;
use tracing::debug;

use crate::CreateSnapshotData;
use crate::HybridTime;
use crate::ReplicationError;
use crate::RestorationId;
use crate::Result;
use crate::SnapshotId;
use crate::WriteBatch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEntry {
    CreateSnapshot(CreateSnapshotData),
    DeleteSnapshot {
        snapshot_id: SnapshotId,
    },
    RestoreSysCatalog {
        snapshot_id: SnapshotId,
        restore_at: HybridTime,
        restoration_id: RestorationId,
    },
    /// Direct record writes: schedule upserts, snapshot updates, tombstones.
    WriteBatch(WriteBatch),
}

impl LogEntry {
    pub fn name(&self) -> &'static str {
        match self {
            LogEntry::CreateSnapshot(_) => "create_snapshot",
            LogEntry::DeleteSnapshot { .. } => "delete_snapshot",
            LogEntry::RestoreSysCatalog { .. } => "restore_sys_catalog",
            LogEntry::WriteBatch(_) => "write_pair",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Completion of a submitted entry: resolves once it is committed and applied
/// on this node, with the result of the local apply.
pub type CommitReceiver = oneshot::Receiver<Result<()>>;

#[cfg_attr(test, automock)]
pub trait Replicator: Send + Sync + 'static {
    /// Appends `entry` on behalf of `leader_term`.
    ///
    /// Submission never blocks; commit is observed through the returned
    /// receiver. An entry submitted with a stale term is rejected through the
    /// receiver with [`ReplicationError::NotLeader`].
    fn submit(
        &self,
        entry: LogEntry,
        leader_term: i64,
    ) -> CommitReceiver;

    /// Term this node currently leads, negative when it is not the leader.
    fn leader_term(&self) -> i64;
}

/// Consumer of committed entries.
pub trait LogApplier: Send + Sync + 'static {
    fn apply(
        &self,
        leader_term: i64,
        entry: &LogEntry,
    ) -> Result<()>;
}

/// Waits for `commit` until `deadline`.
///
/// On deadline the entry may still commit later; applying it then is harmless.
pub async fn wait_committed(
    commit: CommitReceiver,
    deadline: Instant,
) -> Result<()> {
    let started = Instant::now();
    match timeout_at(deadline, commit).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(ReplicationError::Aborted.into()),
        Err(_) => {
            let waited = Instant::now().saturating_duration_since(started);
            debug!("replicated write not committed after {:?}", waited);
            Err(ReplicationError::DeadlineExceeded(waited).into())
        }
    }
}
