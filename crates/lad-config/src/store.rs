//! Container tree settings.

use std::time::Duration;

use lad_common::TimeField;
use serde::{Deserialize, Serialize};

/// What the first delta query of a (client, scope) pair returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaStart {
    /// Everything currently buffered in scope.
    #[default]
    Snapshot,
    /// Nothing; the cursor starts at the current watermark.
    Empty,
}

impl std::str::FromStr for DeltaStart {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "snapshot" | "full" => Ok(DeltaStart::Snapshot),
            "empty" | "none" => Ok(DeltaStart::Empty),
            _ => Err(format!("unknown delta start mode: {}", s)),
        }
    }
}

/// Settings for the container tree and its leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum records buffered per identifier.
    pub leaf_max_count: usize,

    /// Maximum age of a buffered record relative to the newest record in
    /// the same leaf. `None` disables age-based leaf eviction.
    pub leaf_max_age_ms: Option<u64>,

    /// Timestamp that orders records.
    pub primary_time: TimeField,

    /// Behavior of the first delta query for a client/scope.
    pub delta_start: DeltaStart,

    /// Drop records matching an existing (identifier, time, payload hash).
    pub dedup: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            leaf_max_count: 100,
            leaf_max_age_ms: None,
            primary_time: TimeField::Ert,
            delta_start: DeltaStart::Snapshot,
            dedup: true,
        }
    }
}

impl StoreConfig {
    pub fn leaf_max_age(&self) -> Option<Duration> {
        self.leaf_max_age_ms.map(Duration::from_millis)
    }

    pub fn with_leaf_max_count(mut self, count: usize) -> Self {
        self.leaf_max_count = count;
        self
    }

    pub fn with_leaf_max_age(mut self, age: Duration) -> Self {
        self.leaf_max_age_ms = Some(age.as_millis() as u64);
        self
    }

    pub fn with_primary_time(mut self, field: TimeField) -> Self {
        self.primary_time = field;
        self
    }

    pub fn with_delta_start(mut self, start: DeltaStart) -> Self {
        self.delta_start = start;
        self
    }
}
