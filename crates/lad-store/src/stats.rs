//! Store counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lock-free counters updated by inserts, removals and the reaper.
#[derive(Debug, Default)]
pub struct StoreStats {
    stored_records: AtomicU64,
    inserted: AtomicU64,
    duplicates: AtomicU64,
    stale: AtomicU64,
    evicted_by_bound: AtomicU64,
    aged_out: AtomicU64,
    pressure_evicted: AtomicU64,
    removed: AtomicU64,
    pruned_nodes: AtomicU64,
}

fn bump(counter: &AtomicU64, n: u64) {
    if n > 0 {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

impl StoreStats {
    pub(crate) fn stored(&self, evicted: usize) {
        bump(&self.inserted, 1);
        bump(&self.stored_records, 1);
        self.drop_records(evicted);
        bump(&self.evicted_by_bound, evicted as u64);
    }

    pub(crate) fn duplicate(&self) {
        bump(&self.duplicates, 1);
    }

    pub(crate) fn stale(&self) {
        bump(&self.stale, 1);
    }

    pub(crate) fn aged_out(&self, n: usize) {
        self.drop_records(n);
        bump(&self.aged_out, n as u64);
    }

    pub(crate) fn pressure_evicted(&self, n: usize) {
        self.drop_records(n);
        bump(&self.pressure_evicted, n as u64);
    }

    pub(crate) fn removed(&self, n: usize) {
        self.drop_records(n);
        bump(&self.removed, n as u64);
    }

    pub(crate) fn pruned(&self, nodes: usize) {
        bump(&self.pruned_nodes, nodes as u64);
    }

    fn drop_records(&self, n: usize) {
        if n > 0 {
            self.stored_records.fetch_sub(n as u64, Ordering::Relaxed);
        }
    }

    /// Records currently buffered across all leaves.
    pub fn stored_records(&self) -> u64 {
        self.stored_records.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            stored_records: self.stored_records(),
            inserted: self.inserted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            evicted_by_bound: self.evicted_by_bound.load(Ordering::Relaxed),
            aged_out: self.aged_out.load(Ordering::Relaxed),
            pressure_evicted: self.pressure_evicted.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            pruned_nodes: self.pruned_nodes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub stored_records: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub stale: u64,
    pub evicted_by_bound: u64,
    pub aged_out: u64,
    pub pressure_evicted: u64,
    pub removed: u64,
    pub pruned_nodes: u64,
}
