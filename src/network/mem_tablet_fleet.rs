use std::collections::HashMap;
use std::collections::VecDeque;

use parking_lot::Mutex;
use tonic::async_trait;
use tracing::trace;

use super::TabletFleet;
use super::TabletOpType;
use super::TabletRequest;
use crate::TabletId;

#[derive(Debug, Default)]
struct FleetState {
    requests: Vec<(TabletId, TabletRequest)>,
    /// Replies for every request of a kind until cleared.
    sticky: HashMap<(TabletId, TabletOpType), tonic::Status>,
    /// Replies consumed one request at a time, ahead of sticky ones.
    queued: HashMap<(TabletId, TabletOpType), VecDeque<tonic::Status>>,
}

/// In-process fleet of instantly answering workers.
///
/// Every request succeeds unless a failure was scripted for its tablet and
/// operation type. All requests are recorded for inspection.
#[derive(Debug, Default)]
pub struct MemTabletFleet {
    state: Mutex<FleetState>,
}

impl MemTabletFleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every `op` on `tablet_id` with `status` until [`Self::clear_failures`].
    pub fn fail_with(
        &self,
        tablet_id: &str,
        op: TabletOpType,
        status: tonic::Status,
    ) {
        self.state.lock().sticky.insert((tablet_id.to_string(), op), status);
    }

    /// Fails only the next `op` on `tablet_id`.
    pub fn fail_next(
        &self,
        tablet_id: &str,
        op: TabletOpType,
        status: tonic::Status,
    ) {
        self.state
            .lock()
            .queued
            .entry((tablet_id.to_string(), op))
            .or_default()
            .push_back(status);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.sticky.clear();
        state.queued.clear();
    }

    pub fn requests(&self) -> Vec<(TabletId, TabletRequest)> {
        self.state.lock().requests.clone()
    }

    pub fn requests_of(
        &self,
        op: TabletOpType,
    ) -> Vec<(TabletId, TabletRequest)> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|(_, request)| request.op_type() == op)
            .cloned()
            .collect()
    }

    pub fn clear_requests(&self) {
        self.state.lock().requests.clear();
    }
}

#[async_trait]
impl TabletFleet for MemTabletFleet {
    async fn send(
        &self,
        tablet_id: TabletId,
        request: TabletRequest,
    ) -> std::result::Result<(), tonic::Status> {
        let mut state = self.state.lock();
        let key = (tablet_id.clone(), request.op_type());
        trace!("tablet {} <- {:?}", tablet_id, request);
        state.requests.push((tablet_id, request));

        if let Some(status) = state.queued.get_mut(&key).and_then(|q| q.pop_front()) {
            return Err(status);
        }
        match state.sticky.get(&key) {
            Some(status) => Err(status.clone()),
            None => Ok(()),
        }
    }
}
