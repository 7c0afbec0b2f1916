//! Synchronizer configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default interval between sync cycles, in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Default per-fetch deadline, in milliseconds.
pub const DEFAULT_FETCH_TIMEOUT_MILLIS: u64 = 10_000;

/// Configuration for the cache synchronizer.
///
/// The poll interval is expected to be much larger than fetch latency, so
/// cycles never overlap: the timer only schedules the next cycle after the
/// previous one completes or aborts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between sync cycles.
    pub poll_interval_secs: u64,

    /// Deadline for each remote fetch, in milliseconds. A fetch that
    /// exceeds it is treated identically to a network error.
    pub fetch_timeout_millis: u64,
}

impl SyncConfig {
    /// Returns the poll interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Returns the per-fetch deadline as a [`Duration`].
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_millis)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            fetch_timeout_millis: DEFAULT_FETCH_TIMEOUT_MILLIS,
        }
    }
}
