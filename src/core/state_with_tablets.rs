//! Per-tablet progress tracking shared by snapshots and restorations.
//!
//! Every tablet starts in the owner's initial phase (CREATING, DELETING or
//! RESTORING). The tick hands out one operation per idle tablet through
//! [`StateWithTablets::prepare`]; worker replies come back through
//! [`StateWithTablets::done`] and move the tablet to a terminal phase, or leave
//! it idle in the initial phase so the next tick retries it.
//!
//! A tablet marked running has exactly one outstanding RPC. The phase the RPC
//! was issued for is remembered so that a reply arriving after the initial
//! phase changed (e.g. CREATE reply after a DELETE was requested) does not
//! complete the wrong operation.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::error;
use tracing::trace;

use crate::HybridTime;
use crate::Result;
use crate::SnapshotError;
use crate::TabletId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TabletPhase {
    Creating,
    Complete,
    Deleting,
    Deleted,
    Failed,
    Restoring,
    Restored,
}

impl TabletPhase {
    /// Phase a tablet reaches when the operation of this initial phase succeeds.
    pub fn terminal_on_success(self) -> TabletPhase {
        match self {
            TabletPhase::Creating => TabletPhase::Complete,
            TabletPhase::Deleting => TabletPhase::Deleted,
            TabletPhase::Restoring => TabletPhase::Restored,
            other => other,
        }
    }

    pub fn is_initial(self) -> bool {
        matches!(
            self,
            TabletPhase::Creating | TabletPhase::Deleting | TabletPhase::Restoring
        )
    }
}

impl fmt::Display for TabletPhase {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            TabletPhase::Creating => "CREATING",
            TabletPhase::Complete => "COMPLETE",
            TabletPhase::Deleting => "DELETING",
            TabletPhase::Deleted => "DELETED",
            TabletPhase::Failed => "FAILED",
            TabletPhase::Restoring => "RESTORING",
            TabletPhase::Restored => "RESTORED",
        };
        f.write_str(name)
    }
}

/// Durable form of one tablet's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabletEntry {
    pub id: TabletId,
    pub phase: TabletPhase,
}

#[derive(Debug, Clone)]
pub(crate) struct TabletData {
    pub(crate) phase: TabletPhase,
    pub(crate) last_error: Option<tonic::Status>,
    /// Initial phase the outstanding RPC was issued for.
    running: Option<TabletPhase>,
}

impl TabletData {
    fn new(phase: TabletPhase) -> Self {
        Self {
            phase,
            last_error: None,
            running: None,
        }
    }
}

/// Decides whether a worker error ends the tablet's operation for good.
pub type TerminalFailureFn = fn(&tonic::Status) -> bool;

#[derive(Debug, Clone)]
pub struct StateWithTablets {
    initial_phase: TabletPhase,
    tablets: BTreeMap<TabletId, TabletData>,
    num_tablets_in_initial_phase: usize,
    /// Time when the last tablet left the initial phase.
    complete_at: Option<HybridTime>,
    is_terminal_failure: TerminalFailureFn,
}

impl StateWithTablets {
    pub fn new(
        initial_phase: TabletPhase,
        is_terminal_failure: TerminalFailureFn,
    ) -> Self {
        Self {
            initial_phase,
            tablets: BTreeMap::new(),
            num_tablets_in_initial_phase: 0,
            complete_at: None,
            is_terminal_failure,
        }
    }

    pub fn initial_phase(&self) -> TabletPhase {
        self.initial_phase
    }

    /// Puts every tablet into the initial phase, nothing running.
    pub fn init<I>(
        &mut self,
        tablet_ids: I,
        now: HybridTime,
    ) where
        I: IntoIterator<Item = TabletId>,
    {
        let phase = self.initial_phase;
        self.tablets = tablet_ids
            .into_iter()
            .map(|id| (id, TabletData::new(phase)))
            .collect();
        self.num_tablets_in_initial_phase = self.tablets.len();
        self.check_completeness(now);
    }

    /// Restores tablet phases from their durable form.
    pub fn init_tablets(
        &mut self,
        entries: &[TabletEntry],
        now: HybridTime,
    ) {
        self.tablets = entries
            .iter()
            .map(|e| (e.id.clone(), TabletData::new(e.phase)))
            .collect();
        self.num_tablets_in_initial_phase = self
            .tablets
            .values()
            .filter(|t| t.phase == self.initial_phase)
            .count();
        self.check_completeness(now);
    }

    /// Moves every tablet (failed ones included) into a new initial phase.
    ///
    /// Outstanding RPCs keep their running mark until they reply, so a new
    /// operation is never issued next to an old one for the same tablet.
    pub fn set_initial_phase(
        &mut self,
        phase: TabletPhase,
        now: HybridTime,
    ) {
        self.initial_phase = phase;
        for data in self.tablets.values_mut() {
            data.phase = phase;
        }
        self.num_tablets_in_initial_phase = self.tablets.len();
        self.complete_at = None;
        self.check_completeness(now);
    }

    /// Invokes `f` for every idle tablet still in the initial phase and marks it running.
    pub fn prepare<F>(
        &mut self,
        mut f: F,
    ) where
        F: FnMut(&TabletId),
    {
        let initial = self.initial_phase;
        for (id, data) in self.tablets.iter_mut() {
            if data.running.is_some() || data.phase != initial {
                continue;
            }
            trace!("prepare operation for {} in {}", id, initial);
            f(id);
            data.running = Some(initial);
        }
    }

    /// Records the outcome of a tablet RPC.
    pub fn done(
        &mut self,
        tablet_id: &TabletId,
        result: std::result::Result<(), tonic::Status>,
        now: HybridTime,
    ) {
        let initial = self.initial_phase;
        let is_terminal_failure = self.is_terminal_failure;
        let data = match self.tablets.get_mut(tablet_id) {
            Some(data) => data,
            None => {
                error!("received reply for unknown tablet {}", tablet_id);
                return;
            }
        };
        let issued_for = data.running.take();
        if issued_for != Some(initial) || data.phase != initial {
            debug!(
                "ignore stale reply for {}: issued for {:?}, current phase {}, initial {}",
                tablet_id, issued_for, data.phase, initial
            );
            return;
        }

        match result {
            Ok(()) => {
                data.phase = initial.terminal_on_success();
                data.last_error = None;
            }
            Err(status) => {
                let terminal = is_terminal_failure(&status);
                debug!(
                    "tablet {} failed in {} (terminal: {}): {}",
                    tablet_id, initial, terminal, status
                );
                data.last_error = Some(status);
                if !terminal {
                    return;
                }
                data.phase = TabletPhase::Failed;
            }
        }
        self.num_tablets_in_initial_phase -= 1;
        self.check_completeness(now);
    }

    /// Drops the running mark of `tablet_id` without recording an outcome,
    /// so the next tick issues the operation again.
    pub fn release(
        &mut self,
        tablet_id: &TabletId,
    ) {
        if let Some(data) = self.tablets.get_mut(tablet_id) {
            data.running = None;
        }
    }

    pub fn all_done(&self) -> bool {
        self.num_tablets_in_initial_phase == 0
    }

    /// FAILED if any tablet failed; else the initial phase if any tablet is
    /// still in it; else the terminal phase all tablets share.
    pub fn aggregated(&self) -> Result<TabletPhase> {
        if self.tablets.is_empty() {
            return Ok(self.initial_phase.terminal_on_success());
        }
        let mut has_initial = false;
        let mut terminal: Option<TabletPhase> = None;
        for (id, data) in &self.tablets {
            if data.phase == TabletPhase::Failed {
                return Ok(TabletPhase::Failed);
            }
            if data.phase == self.initial_phase {
                has_initial = true;
                continue;
            }
            match terminal {
                None => terminal = Some(data.phase),
                Some(phase) if phase != data.phase => {
                    return Err(SnapshotError::IllegalState(format!(
                        "tablets in different terminal states: {} and {} ({})",
                        phase, data.phase, id
                    ))
                    .into());
                }
                Some(_) => {}
            }
        }
        if has_initial {
            return Ok(self.initial_phase);
        }
        Ok(terminal.unwrap_or(self.initial_phase))
    }

    /// First recorded failure of a FAILED tablet.
    pub fn any_failure(&self) -> Option<tonic::Status> {
        self.tablets.iter().find_map(|(id, data)| {
            if data.phase != TabletPhase::Failed {
                return None;
            }
            Some(
                data.last_error
                    .clone()
                    .unwrap_or_else(|| tonic::Status::aborted(format!("tablet {} failed", id))),
            )
        })
    }

    pub fn passed_since_completion(
        &self,
        duration: Duration,
        now: HybridTime,
    ) -> bool {
        match self.complete_at {
            Some(at) if self.all_done() => now.duration_since(at) >= duration,
            _ => false,
        }
    }

    pub fn is_running(
        &self,
        tablet_id: &TabletId,
    ) -> bool {
        self.tablets
            .get(tablet_id)
            .map(|t| t.running.is_some())
            .unwrap_or(false)
    }

    pub fn tablet_ids(&self) -> impl Iterator<Item = &TabletId> {
        self.tablets.keys()
    }

    pub fn tablet_phase(
        &self,
        tablet_id: &TabletId,
    ) -> Option<TabletPhase> {
        self.tablets.get(tablet_id).map(|t| t.phase)
    }

    pub fn is_empty(&self) -> bool {
        self.tablets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tablets.len()
    }

    pub fn to_entries(&self) -> Vec<TabletEntry> {
        self.tablets
            .iter()
            .map(|(id, data)| TabletEntry {
                id: id.clone(),
                phase: data.phase,
            })
            .collect()
    }

    fn check_completeness(
        &mut self,
        now: HybridTime,
    ) {
        if self.num_tablets_in_initial_phase == 0 && self.complete_at.is_none() {
            self.complete_at = Some(now);
        }
    }
}
