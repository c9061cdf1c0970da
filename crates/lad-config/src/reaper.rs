//! Reaper and memory-threshold settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for the background reaper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// Run the reaper on a background thread.
    pub enabled: bool,

    /// Interval between reaper passes.
    pub interval_ms: u64,

    /// Records older than `now - window` are removed on every pass.
    pub retention_window_ms: Option<u64>,

    /// Records newer than `now - window` are never evicted for memory
    /// pressure; pressure that cannot be relieved is reported instead.
    pub protected_window_ms: Option<u64>,

    /// Memory occupancy percentage that starts a pressure-relief pass.
    pub memory_threshold_percent: f64,

    /// Upper bound on pressure evictions in a single pass.
    pub max_evictions_per_pass: usize,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        ReaperConfig {
            enabled: true,
            interval_ms: 5_000,
            retention_window_ms: None,
            protected_window_ms: None,
            memory_threshold_percent: 80.0,
            max_evictions_per_pass: 10_000,
        }
    }
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn retention_window(&self) -> Option<Duration> {
        self.retention_window_ms.map(Duration::from_millis)
    }

    pub fn protected_window(&self) -> Option<Duration> {
        self.protected_window_ms.map(Duration::from_millis)
    }
}
