//! Memory occupancy sampling.
//!
//! [`MemoryThresholdChecker`] compares `used / max * 100` from a
//! [`MemoryProbe`] against a configured percentage. The Linux probe reads
//! the process resident set from `/proc/self/status` and bounds it by the
//! cgroup v2 `memory.max` when one is set, else by `MemTotal`.

use std::fs;
use std::sync::Arc;

use lad_config::ReaperConfig;
use serde::Serialize;
use tracing::debug;

use crate::capability::Reapable;

/// Where a sample's ceiling came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    CgroupV2,
    MemTotal,
    RecordBudget,
    Synthetic,
    /// Nothing could be read; the sample reports zero occupancy.
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemorySample {
    pub used: u64,
    pub max: u64,
    pub source: MemorySource,
}

impl MemorySample {
    pub fn new(used: u64, max: u64, source: MemorySource) -> Self {
        MemorySample { used, max, source }
    }

    pub fn synthetic(used: u64, max: u64) -> Self {
        MemorySample::new(used, max, MemorySource::Synthetic)
    }

    pub fn unavailable() -> Self {
        MemorySample::new(0, 0, MemorySource::Unavailable)
    }

    pub fn used_percent(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        self.used as f64 / self.max as f64 * 100.0
    }
}

pub trait MemoryProbe: Send + Sync {
    fn sample(&self) -> MemorySample;
}

impl<F> MemoryProbe for F
where
    F: Fn() -> MemorySample + Send + Sync,
{
    fn sample(&self) -> MemorySample {
        self()
    }
}

#[derive(Clone)]
pub struct MemoryThresholdChecker {
    probe: Arc<dyn MemoryProbe>,
    threshold_percent: f64,
}

impl std::fmt::Debug for MemoryThresholdChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryThresholdChecker")
            .field("threshold_percent", &self.threshold_percent)
            .finish_non_exhaustive()
    }
}

/// Occupancy report for health polling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryStatus {
    pub used: u64,
    pub max: u64,
    pub source: MemorySource,
    pub used_percent: f64,
    pub threshold_percent: f64,
    pub over_threshold: bool,
}

impl MemoryThresholdChecker {
    pub fn new(probe: Arc<dyn MemoryProbe>, threshold_percent: f64) -> Self {
        MemoryThresholdChecker {
            probe,
            threshold_percent,
        }
    }

    pub fn from_config(config: &ReaperConfig, probe: Arc<dyn MemoryProbe>) -> Self {
        MemoryThresholdChecker::new(probe, config.memory_threshold_percent)
    }

    /// Checker over the current process.
    pub fn for_process(threshold_percent: f64) -> Self {
        MemoryThresholdChecker::new(Arc::new(ProcMemoryProbe::default()), threshold_percent)
    }

    pub fn threshold_percent(&self) -> f64 {
        self.threshold_percent
    }

    pub fn sample(&self) -> MemorySample {
        self.probe.sample()
    }

    /// True when occupancy is strictly above the threshold.
    pub fn is_over_threshold(&self) -> bool {
        self.sample().used_percent() > self.threshold_percent
    }

    pub fn status(&self) -> MemoryStatus {
        let sample = self.sample();
        let used_percent = sample.used_percent();
        MemoryStatus {
            used: sample.used,
            max: sample.max,
            source: sample.source,
            used_percent,
            threshold_percent: self.threshold_percent,
            over_threshold: used_percent > self.threshold_percent,
        }
    }
}

/// Resident set of this process against its memory ceiling.
#[derive(Debug, Clone)]
pub struct ProcMemoryProbe {
    proc_root: String,
    cgroup_root: String,
}

impl Default for ProcMemoryProbe {
    fn default() -> Self {
        ProcMemoryProbe {
            proc_root: "/proc".to_string(),
            cgroup_root: "/sys/fs/cgroup".to_string(),
        }
    }
}

impl ProcMemoryProbe {
    /// Probe reading from alternate roots (used by tests).
    pub fn with_roots(proc_root: impl Into<String>, cgroup_root: impl Into<String>) -> Self {
        ProcMemoryProbe {
            proc_root: proc_root.into(),
            cgroup_root: cgroup_root.into(),
        }
    }

    fn read(&self, path: &str) -> Option<String> {
        match fs::read_to_string(path) {
            Ok(content) => Some(content),
            Err(e) => {
                debug!(path, error = %e, "memory probe read failed");
                None
            }
        }
    }

    fn cgroup_limit(&self) -> Option<u64> {
        let cgroup = self.read(&format!("{}/self/cgroup", self.proc_root))?;
        let unified = parse_cgroup_unified_path(&cgroup)?;
        let max = self.read(&format!("{}{}/memory.max", self.cgroup_root, unified))?;
        parse_memory_max(&max)
    }
}

impl MemoryProbe for ProcMemoryProbe {
    fn sample(&self) -> MemorySample {
        let Some(used) = self
            .read(&format!("{}/self/status", self.proc_root))
            .and_then(|s| parse_status_rss(&s))
        else {
            return MemorySample::unavailable();
        };
        if let Some(max) = self.cgroup_limit() {
            return MemorySample::new(used, max, MemorySource::CgroupV2);
        }
        match self
            .read(&format!("{}/meminfo", self.proc_root))
            .and_then(|s| parse_meminfo_total(&s))
        {
            Some(max) => MemorySample::new(used, max, MemorySource::MemTotal),
            None => MemorySample::unavailable(),
        }
    }
}

/// Stored record count against a fixed budget.
///
/// Useful where process RSS is a poor proxy (allocator retention) and in
/// tests that need occupancy to respond to evictions.
pub struct RecordBudgetProbe<R> {
    target: Arc<R>,
    budget: u64,
}

impl<R: Reapable> RecordBudgetProbe<R> {
    pub fn new(target: Arc<R>, budget: u64) -> Self {
        RecordBudgetProbe { target, budget }
    }
}

impl<R: Reapable> MemoryProbe for RecordBudgetProbe<R> {
    fn sample(&self) -> MemorySample {
        MemorySample::new(
            self.target.record_count(),
            self.budget,
            MemorySource::RecordBudget,
        )
    }
}

fn kb_field(content: &str, key: &str) -> Option<u64> {
    content.lines().find_map(|line| {
        let rest = line.strip_prefix(key)?.strip_prefix(':')?;
        let kb: u64 = rest.split_whitespace().next()?.parse().ok()?;
        Some(kb * 1024)
    })
}

/// `VmRSS` from `/proc/<pid>/status`, in bytes.
pub fn parse_status_rss(content: &str) -> Option<u64> {
    kb_field(content, "VmRSS")
}

/// `MemTotal` from `/proc/meminfo`, in bytes.
pub fn parse_meminfo_total(content: &str) -> Option<u64> {
    kb_field(content, "MemTotal")
}

/// Path of the cgroup v2 hierarchy entry (`0::<path>`).
pub fn parse_cgroup_unified_path(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("0::"))
        .map(|path| path.trim().trim_end_matches('/').to_string())
}

/// Contents of `memory.max`; `max` means unlimited.
pub fn parse_memory_max(content: &str) -> Option<u64> {
    match content.trim() {
        "max" | "" => None,
        value => value.parse().ok(),
    }
}
