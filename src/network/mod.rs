//! Coordinator to tablet worker transport.
//!
//! The coordinator never tracks which worker currently leads a tablet: it
//! hands a [`TabletRequest`] to the [`TabletFleet`], which resolves the
//! primary, retries and fails over on its own. Every request is idempotent
//! at the worker, so the coordinator may resend it after any error.

mod mem_tablet_fleet;

pub use mem_tablet_fleet::*;

#[cfg(test)]
use mockall::automock;
use tonic::async_trait;

use crate::HybridTime;
use crate::RestorationId;
use crate::ScheduleId;
use crate::SnapshotId;
use crate::TabletId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TabletOpType {
    Create,
    Delete,
    Restore,
    RestoreFinished,
}

impl TabletOpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TabletOpType::Create => "create_on_tablet",
            TabletOpType::Delete => "delete_on_tablet",
            TabletOpType::Restore => "restore_on_tablet",
            TabletOpType::RestoreFinished => "restore_finished",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabletRequest {
    CreateOnTablet {
        snapshot_id: SnapshotId,
        schedule_id: Option<ScheduleId>,
        snapshot_time: HybridTime,
    },
    DeleteOnTablet {
        snapshot_id: SnapshotId,
    },
    RestoreOnTablet {
        /// Nil when the tablet did not participate in the snapshot: the
        /// worker only moves its history cutoff.
        snapshot_id: SnapshotId,
        restore_at: HybridTime,
        restoration_id: RestorationId,
        send_metadata: bool,
        table_schema: Option<Vec<u8>>,
    },
    RestoreFinished {
        restoration_id: RestorationId,
        complete_time: HybridTime,
    },
}

impl TabletRequest {
    pub fn op_type(&self) -> TabletOpType {
        match self {
            TabletRequest::CreateOnTablet { .. } => TabletOpType::Create,
            TabletRequest::DeleteOnTablet { .. } => TabletOpType::Delete,
            TabletRequest::RestoreOnTablet { .. } => TabletOpType::Restore,
            TabletRequest::RestoreFinished { .. } => TabletOpType::RestoreFinished,
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait TabletFleet: Send + Sync + 'static {
    /// Delivers `request` to the current primary of `tablet_id`.
    ///
    /// # Errors
    /// The worker's status. Whether it is worth retrying is decided by the
    /// caller from the status code.
    async fn send(
        &self,
        tablet_id: TabletId,
        request: TabletRequest,
    ) -> std::result::Result<(), tonic::Status>;
}
