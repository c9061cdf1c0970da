//! Per-identifier time-series buffer.
//!
//! Records are kept sorted by (primary time, commit sequence). Arrivals are
//! mostly in order, so insertion checks the tail first and falls back to a
//! binary search for jittered records. The buffer is bounded by a record
//! count and optionally by age relative to its newest record.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use lad_common::Record;
use lad_config::StoreConfig;

use crate::summary::Summary;

/// Local eviction bounds applied on every insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafPolicy {
    pub max_count: usize,
    pub max_age: Option<Duration>,
    pub dedup: bool,
}

impl LeafPolicy {
    pub fn from_config(config: &StoreConfig) -> Self {
        LeafPolicy {
            max_count: config.leaf_max_count.max(1),
            max_age: config
                .leaf_max_age()
                .and_then(|age| Duration::from_std(age).ok()),
            dedup: config.dedup,
        }
    }
}

impl Default for LeafPolicy {
    fn default() -> Self {
        LeafPolicy::from_config(&StoreConfig::default())
    }
}

/// A buffered record with its ordering key and duplicate-detection digest.
#[derive(Debug, Clone)]
pub struct LeafEntry {
    pub time: DateTime<Utc>,
    pub seq: u64,
    pub digest: [u8; 32],
    pub record: Arc<Record>,
}

impl LeafEntry {
    fn key(&self) -> (DateTime<Utc>, u64) {
        (self.time, self.seq)
    }
}

/// Result of offering a record to a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafInsert {
    /// Buffered; `evicted` older records were dropped to honor the bounds.
    Stored { evicted: usize },
    /// Same (identifier, time, payload digest) already buffered.
    Duplicate,
    /// Older than everything the bounds allow; not buffered.
    Stale,
}

#[derive(Debug, Default)]
pub struct TimeSeriesLeaf {
    entries: VecDeque<LeafEntry>,
}

impl TimeSeriesLeaf {
    pub fn new() -> Self {
        TimeSeriesLeaf::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn oldest_time(&self) -> Option<DateTime<Utc>> {
        self.entries.front().map(|e| e.time)
    }

    pub fn latest_time(&self) -> Option<DateTime<Utc>> {
        self.entries.back().map(|e| e.time)
    }

    pub fn summary(&self) -> Summary {
        Summary::for_leaf(self.entries.len(), self.oldest_time(), self.latest_time())
    }

    pub fn entries(&self) -> impl Iterator<Item = &LeafEntry> {
        self.entries.iter()
    }

    pub fn insert(&mut self, entry: LeafEntry, policy: &LeafPolicy) -> LeafInsert {
        if policy.dedup && self.contains_duplicate(entry.time, &entry.digest) {
            return LeafInsert::Duplicate;
        }

        let newest = self
            .latest_time()
            .map_or(entry.time, |latest| latest.max(entry.time));
        let cutoff = policy
            .max_age
            .and_then(|age| newest.checked_sub_signed(age));
        if cutoff.is_some_and(|cutoff| entry.time < cutoff) {
            return LeafInsert::Stale;
        }

        // A full buffer would drop the new record straight away.
        if self.entries.len() >= policy.max_count {
            if let Some(oldest) = self.entries.front() {
                if entry.key() < oldest.key() {
                    return LeafInsert::Stale;
                }
            }
        }

        let pos = self.position_for(entry.key());
        self.entries.insert(pos, entry);

        let mut evicted = 0;
        while self.entries.len() > policy.max_count {
            self.entries.pop_front();
            evicted += 1;
        }
        if let Some(cutoff) = cutoff {
            evicted += self.drain_older_than(cutoff);
        }

        LeafInsert::Stored { evicted }
    }

    fn position_for(&self, key: (DateTime<Utc>, u64)) -> usize {
        match self.entries.back() {
            None => 0,
            Some(last) if last.key() <= key => self.entries.len(),
            Some(_) => self.entries.partition_point(|e| e.key() <= key),
        }
    }

    fn contains_duplicate(&self, time: DateTime<Utc>, digest: &[u8; 32]) -> bool {
        let start = self.entries.partition_point(|e| e.time < time);
        self.entries
            .range(start..)
            .take_while(|e| e.time == time)
            .any(|e| &e.digest == digest)
    }

    /// Up to `limit` most recent records within `[since, until]`, oldest first.
    pub fn latest(
        &self,
        limit: usize,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Vec<Arc<Record>> {
        let mut out: Vec<Arc<Record>> = self
            .entries
            .iter()
            .rev()
            .filter(|e| since.is_none_or(|s| e.time >= s) && until.is_none_or(|u| e.time <= u))
            .take(limit)
            .map(|e| Arc::clone(&e.record))
            .collect();
        out.reverse();
        out
    }

    /// Records committed in the sequence window `(after, up_to]`, oldest first.
    pub fn committed_between(&self, after: u64, up_to: u64) -> Vec<&LeafEntry> {
        self.entries
            .iter()
            .filter(|e| e.seq > after && e.seq <= up_to)
            .collect()
    }

    pub fn pop_oldest(&mut self) -> Option<LeafEntry> {
        self.entries.pop_front()
    }

    /// Drop every record strictly older than `cutoff`.
    pub fn drain_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let n = self.entries.partition_point(|e| e.time < cutoff);
        self.entries.drain(..n);
        n
    }

    /// Drop everything and release the buffer.
    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries = VecDeque::new();
        n
    }
}
