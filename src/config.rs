//! Process-wide controller configuration.
//!
//! The only tunable is the poll interval, read once at startup from the
//! `POLL_INTERVAL` environment variable. It accepts any humantime duration
//! grammar (`30s`, `2m`, `1h30m`); malformed or unset values fall back to
//! the built-in default.

use std::time::Duration;

/// Environment variable overriding the poll interval.
pub const POLL_INTERVAL_ENV: &str = "POLL_INTERVAL";

/// Default interval between reconciles of a trigger.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Controller configuration, established at startup and read-only after.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Interval between successive reconciles of the same trigger.
    pub poll_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_raw(std::env::var(POLL_INTERVAL_ENV).ok().as_deref())
    }

    fn from_raw(raw: Option<&str>) -> Self {
        let poll_interval = match raw.map(str::trim) {
            None | Some("") => DEFAULT_POLL_INTERVAL,
            Some(value) => match humantime::parse_duration(value) {
                Ok(interval) => interval,
                Err(error) => {
                    tracing::warn!(
                        value = %value,
                        error = %error,
                        "Malformed POLL_INTERVAL, using default"
                    );
                    DEFAULT_POLL_INTERVAL
                }
            },
        };
        Self { poll_interval }
    }
}
