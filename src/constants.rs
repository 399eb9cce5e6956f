/// Leader term passed to apply on follower replay. Apply must not emit
/// worker RPCs or retries for it.
pub const UNKNOWN_TERM: i64 = -1;

/// Prefix for environment variable overrides, e.g. `SNAPSHOT__COORDINATOR__POLL_INTERVAL_MS`.
pub(crate) const ENV_PREFIX: &str = "SNAPSHOT";
pub(crate) const ENV_SEPARATOR: &str = "__";

/// Environment variable naming an optional configuration file.
pub(crate) const CONFIG_PATH_ENV: &str = "CONFIG_PATH";
