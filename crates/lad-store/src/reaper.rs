//! Retention and memory-pressure reaping.
//!
//! A pass runs three steps:
//!
//! 1. **Age-out**: with a retention window configured, drop every record
//!    older than `now - window`, regardless of memory pressure.
//! 2. **Pressure relief**: while the threshold checker reports pressure,
//!    evict the single oldest record in the store (min-heap keyed by each
//!    leaf's oldest time) and re-check. Records inside the protected window
//!    are never evicted; if only those remain, the pass reports capacity
//!    exhaustion instead.
//! 3. **Prune**: detach internal nodes and leaves left empty.
//!
//! Leaves locked by a writer are skipped and picked up on the next pass.
//! A pass never fails; problems are reported in [`ReapReport`] and logged.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lad_common::{Error, Result};
use lad_config::ReaperConfig;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::capability::{AgeOutReport, EvictStep, Reapable};
use crate::memory::MemoryThresholdChecker;
use crate::sync::lock;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PressureOutcome {
    NotUnderPressure,
    /// Occupancy dropped to the threshold or below.
    Relieved,
    /// Still over threshold with nothing left to evict.
    StoreEmpty,
    /// Hit `max_evictions_per_pass`; the next pass continues.
    BudgetSpent,
    /// Every remaining candidate was locked by a writer.
    LeavesBusy,
    /// Everything left is inside the protected window.
    CapacityExhausted { remaining: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PressureReport {
    pub outcome: PressureOutcome,
    pub evicted: usize,
    pub skipped_busy: usize,
    pub protected_leaves: usize,
    pub used_percent: f64,
    pub threshold_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReapReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub records_before: u64,
    pub records_after: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_out: Option<AgeOutReport>,
    pub pressure: PressureReport,
    pub pruned_nodes: usize,
}

impl ReapReport {
    /// The capacity condition to surface to monitoring, if any.
    pub fn capacity_error(&self) -> Option<Error> {
        match self.pressure.outcome {
            PressureOutcome::CapacityExhausted { remaining } => Some(Error::CapacityExhausted {
                used_percent: self.pressure.used_percent,
                threshold_percent: self.pressure.threshold_percent,
                remaining,
            }),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Reaper
// ---------------------------------------------------------------------------

pub struct Reaper<R> {
    target: Arc<R>,
    checker: MemoryThresholdChecker,
    config: ReaperConfig,
}

impl<R: Reapable> Reaper<R> {
    pub fn new(target: Arc<R>, checker: MemoryThresholdChecker, config: ReaperConfig) -> Self {
        Reaper {
            target,
            checker,
            config,
        }
    }

    pub fn config(&self) -> &ReaperConfig {
        &self.config
    }

    pub fn checker(&self) -> &MemoryThresholdChecker {
        &self.checker
    }

    pub fn run_pass(&self) -> ReapReport {
        self.run_pass_at(Utc::now())
    }

    /// One pass with `now` as the reference for the retention and
    /// protected windows.
    pub fn run_pass_at(&self, now: DateTime<Utc>) -> ReapReport {
        let clock = Instant::now();
        let records_before = self.target.record_count();

        let age_out = window_start(now, self.config.retention_window())
            .map(|cutoff| self.target.age_out(cutoff));
        if let Some(report) = &age_out {
            if report.leaves_skipped > 0 {
                warn!(
                    skipped = report.leaves_skipped,
                    "age-out skipped locked leaves"
                );
            }
        }

        let pressure = self.relieve_pressure(now);
        let pruned_nodes = self.target.prune_empty();

        let report = ReapReport {
            started_at: now,
            duration_ms: clock.elapsed().as_millis() as u64,
            records_before,
            records_after: self.target.record_count(),
            age_out,
            pressure,
            pruned_nodes,
        };

        match report.pressure.outcome {
            PressureOutcome::CapacityExhausted { remaining } => error!(
                remaining,
                used_percent = report.pressure.used_percent,
                threshold_percent = report.pressure.threshold_percent,
                "memory pressure persists; remaining records are inside the protected window"
            ),
            PressureOutcome::StoreEmpty => warn!(
                used_percent = report.pressure.used_percent,
                "memory pressure persists with an empty store"
            ),
            PressureOutcome::LeavesBusy | PressureOutcome::BudgetSpent => warn!(
                outcome = ?report.pressure.outcome,
                evicted = report.pressure.evicted,
                "pressure relief incomplete; continuing next pass"
            ),
            PressureOutcome::NotUnderPressure | PressureOutcome::Relieved => {}
        }
        info!(
            records_before = report.records_before,
            records_after = report.records_after,
            aged_out = report.age_out.map_or(0, |a| a.records),
            evicted = report.pressure.evicted,
            pruned = report.pruned_nodes,
            duration_ms = report.duration_ms,
            "reaper pass"
        );
        report
    }

    fn relieve_pressure(&self, now: DateTime<Utc>) -> PressureReport {
        let mut report = PressureReport {
            outcome: PressureOutcome::NotUnderPressure,
            evicted: 0,
            skipped_busy: 0,
            protected_leaves: 0,
            used_percent: 0.0,
            threshold_percent: self.checker.threshold_percent(),
        };
        if !self.checker.is_over_threshold() {
            report.used_percent = self.checker.sample().used_percent();
            return report;
        }

        let protect_after = window_start(now, self.config.protected_window());
        let candidates = self.target.eviction_candidates();
        let mut heap: BinaryHeap<Reverse<(DateTime<Utc>, usize)>> = candidates
            .iter()
            .enumerate()
            .map(|(idx, (oldest, _))| Reverse((*oldest, idx)))
            .collect();
        debug!(candidates = candidates.len(), "pressure relief started");

        report.outcome = loop {
            if report.evicted >= self.config.max_evictions_per_pass {
                break PressureOutcome::BudgetSpent;
            }
            let Some(Reverse((_, idx))) = heap.pop() else {
                break if report.protected_leaves > 0 {
                    PressureOutcome::CapacityExhausted {
                        remaining: self.target.record_count(),
                    }
                } else if report.skipped_busy > 0 {
                    PressureOutcome::LeavesBusy
                } else {
                    PressureOutcome::StoreEmpty
                };
            };
            match self.target.evict_oldest(&candidates[idx].1, protect_after) {
                EvictStep::Evicted { next_oldest } => {
                    report.evicted += 1;
                    if let Some(next) = next_oldest {
                        heap.push(Reverse((next, idx)));
                    }
                    if !self.checker.is_over_threshold() {
                        break PressureOutcome::Relieved;
                    }
                }
                EvictStep::Busy => report.skipped_busy += 1,
                EvictStep::Protected => report.protected_leaves += 1,
                EvictStep::Empty => {}
            }
        };
        report.used_percent = self.checker.sample().used_percent();
        report
    }
}

fn window_start(now: DateTime<Utc>, window: Option<Duration>) -> Option<DateTime<Utc>> {
    let window = chrono::Duration::from_std(window?).ok()?;
    now.checked_sub_signed(window)
}

// ---------------------------------------------------------------------------
// Background thread
// ---------------------------------------------------------------------------

/// Runs reaper passes on a dedicated thread at the configured interval.
pub struct ReaperHandle {
    stop: Option<mpsc::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
    last: Arc<Mutex<Option<ReapReport>>>,
    passes: Arc<AtomicU64>,
}

impl ReaperHandle {
    pub fn spawn<R: Reapable + 'static>(reaper: Reaper<R>) -> Result<Self> {
        let interval = reaper.config.interval();
        let (stop, stopped) = mpsc::channel::<()>();
        let last = Arc::new(Mutex::new(None));
        let passes = Arc::new(AtomicU64::new(0));

        let last_clone = Arc::clone(&last);
        let passes_clone = Arc::clone(&passes);
        let thread = thread::Builder::new()
            .name("lad-reaper".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let report = reaper.run_pass();
                        *lock(&last_clone) = Some(report);
                        passes_clone.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        info!(interval_ms = interval.as_millis() as u64, "reaper started");
        Ok(ReaperHandle {
            stop: Some(stop),
            thread: Some(thread),
            last,
            passes,
        })
    }

    pub fn last_report(&self) -> Option<ReapReport> {
        lock(&self.last).clone()
    }

    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Stop the thread, waiting for a pass in progress to finish.
    pub fn stop(mut self) {
        self.shutdown();
        info!("reaper stopped");
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
