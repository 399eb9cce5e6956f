use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Timing parameters of the snapshot coordinator
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CoordinatorConfig {
    /// Period of the tick that dispatches tablet operations, applies
    /// retention and creates scheduled snapshots (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a fully deleted snapshot is kept before its record is
    /// tombstoned (milliseconds)
    #[serde(default = "default_cleanup_delay_ms")]
    pub cleanup_delay_ms: u64,

    /// How long a deleted schedule is kept, once drained of snapshots,
    /// before its record is tombstoned (milliseconds)
    #[serde(default = "default_schedule_cleanup_delay_ms")]
    pub schedule_cleanup_delay_ms: u64,

    /// Bound on replicated writes nobody waits for explicitly (milliseconds)
    #[serde(default = "default_sys_catalog_write_timeout_ms")]
    pub sys_catalog_write_timeout_ms: u64,

    /// Test only: keep restorations open at the workers
    #[serde(default)]
    pub skip_sending_restore_finished: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            cleanup_delay_ms: default_cleanup_delay_ms(),
            schedule_cleanup_delay_ms: default_schedule_cleanup_delay_ms(),
            sys_catalog_write_timeout_ms: default_sys_catalog_write_timeout_ms(),
            skip_sending_restore_finished: false,
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "poll_interval_ms must be greater than 0".into(),
            )));
        }

        if self.sys_catalog_write_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "sys_catalog_write_timeout_ms must be at least 1ms".into(),
            )));
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.cleanup_delay_ms)
    }

    pub fn schedule_cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.schedule_cleanup_delay_ms)
    }

    pub fn sys_catalog_write_timeout(&self) -> Duration {
        Duration::from_millis(self.sys_catalog_write_timeout_ms)
    }
}

fn default_poll_interval_ms() -> u64 {
    5000
}
fn default_cleanup_delay_ms() -> u64 {
    30000
}
fn default_schedule_cleanup_delay_ms() -> u64 {
    30000
}
fn default_sys_catalog_write_timeout_ms() -> u64 {
    15000
}
