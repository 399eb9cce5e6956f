//! Configuration management for the snapshot coordinator.
//!
//! Sources are merged with priority:
//! 1. Default values (hardcoded)
//! 2. Config file named by `CONFIG_PATH`
//! 3. Explicit override file ([`SnapshotConfig::with_override_config`])
//! 4. Environment variables (highest priority), e.g.
//!    `SNAPSHOT__COORDINATOR__POLL_INTERVAL_MS=1000`

mod coordinator;
pub use coordinator::*;


//---
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::CONFIG_PATH_ENV;
use crate::constants::ENV_PREFIX;
use crate::constants::ENV_SEPARATOR;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SnapshotConfig {
    /// Coordinator tick and cleanup timing
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
}

impl SnapshotConfig {
    /// Loads defaults, then `CONFIG_PATH` if set, then environment overrides.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&path));
        }

        let config: Self = builder
            .add_source(Self::environment())
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Merges the TOML file at `path` over the current values. Environment
    /// variables still win.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(Self::environment())
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.coordinator.validate()
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .ignore_empty(true)
            .try_parsing(true)
    }
}
