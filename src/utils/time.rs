use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

#[cfg(test)]
use mockall::automock;

use crate::HybridTime;

/// Source of cluster time for snapshot times, tombstones and restore bookkeeping.
#[cfg_attr(test, automock)]
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> HybridTime;
}

/// Wall clock backed implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> HybridTime {
        HybridTime::from_micros(get_now_as_u64_micros())
    }
}

/// Clock that only moves when told to. Shared handles observe the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: HybridTime) -> Self {
        Self {
            micros: Arc::new(AtomicU64::new(start.as_micros())),
        }
    }

    pub fn set(
        &self,
        time: HybridTime,
    ) {
        self.micros.store(time.as_micros(), Ordering::SeqCst);
    }

    pub fn advance(
        &self,
        duration: Duration,
    ) {
        self.micros
            .fetch_add(duration.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> HybridTime {
        HybridTime::from_micros(self.micros.load(Ordering::SeqCst))
    }
}

/// return microsecond
pub(crate) fn get_now_as_u64_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}
