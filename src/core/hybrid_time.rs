use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// Cluster timestamp in microseconds.
///
/// Snapshot times, restore points and tombstone times are all expressed in
/// this unit. Absence of a time is modelled with `Option<HybridTime>`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct HybridTime(u64);

impl HybridTime {
    pub const MIN: HybridTime = HybridTime(0);
    pub const MAX: HybridTime = HybridTime(u64::MAX);

    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000))
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000))
    }

    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    pub fn add_duration(
        &self,
        duration: Duration,
    ) -> Self {
        Self(self.0.saturating_add(duration.as_micros() as u64))
    }

    pub fn sub_duration(
        &self,
        duration: Duration,
    ) -> Self {
        Self(self.0.saturating_sub(duration.as_micros() as u64))
    }

    pub fn add_millis(
        &self,
        millis: u64,
    ) -> Self {
        self.add_duration(Duration::from_millis(millis))
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    pub fn duration_since(
        &self,
        earlier: HybridTime,
    ) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for HybridTime {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

impl fmt::Debug for HybridTime {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "HT({})", self.0)
    }
}
