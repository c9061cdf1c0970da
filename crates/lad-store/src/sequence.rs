//! Commit sequencing for delta queries.
//!
//! Each insert takes a ticket before touching the tree and releases it once
//! the record is visible in its leaf (or rejected). The committed watermark
//! is the highest sequence below every ticket still outstanding, so a delta
//! query that reads up to the watermark can never skip a record whose
//! insert was still in flight when the query started.
//!
//! The gate takes no lock. Outstanding tickets sit in a fixed table of
//! atomic slots. A slot is claimed with a lower bound of the sequence
//! before the sequence itself is drawn, so a reader scanning the table
//! never misses a ticket numbered below the counter it loaded first.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;

/// Inserts beyond this many in flight wait for a slot to free up.
const SLOTS: usize = 128;
const FREE: u64 = 0;

#[derive(Debug)]
pub struct CommitGate {
    next: AtomicU64,
    slots: Box<[AtomicU64]>,
    hint: AtomicUsize,
}

impl Default for CommitGate {
    fn default() -> Self {
        CommitGate::new()
    }
}

impl CommitGate {
    pub fn new() -> Self {
        CommitGate {
            next: AtomicU64::new(1),
            slots: (0..SLOTS).map(|_| AtomicU64::new(FREE)).collect(),
            hint: AtomicUsize::new(0),
        }
    }

    /// Reserve the next sequence number.
    pub fn begin(&self) -> CommitTicket<'_> {
        let slot = self.claim_slot();
        let seq = self.next.fetch_add(1, Ordering::SeqCst);
        self.slots[slot].store(seq, Ordering::SeqCst);
        CommitTicket {
            gate: self,
            seq,
            slot,
        }
    }

    fn claim_slot(&self) -> usize {
        let start = self.hint.fetch_add(1, Ordering::Relaxed);
        loop {
            for i in 0..SLOTS {
                let idx = start.wrapping_add(i) % SLOTS;
                let slot = &self.slots[idx];
                if slot.load(Ordering::Relaxed) != FREE {
                    continue;
                }
                let floor = self.next.load(Ordering::SeqCst);
                if slot
                    .compare_exchange(FREE, floor, Ordering::SeqCst, Ordering::Relaxed)
                    .is_ok()
                {
                    return idx;
                }
            }
            thread::yield_now();
        }
    }

    /// Highest sequence `w` such that every ticket `<= w` has completed.
    ///
    /// May trail the exact value while a ticket is between claiming its
    /// slot and drawing its sequence.
    pub fn watermark(&self) -> u64 {
        let next = self.next.load(Ordering::SeqCst);
        let oldest = self
            .slots
            .iter()
            .map(|slot| slot.load(Ordering::SeqCst))
            .filter(|&seq| seq != FREE)
            .min()
            .unwrap_or(next);
        oldest.min(next) - 1
    }

    fn complete(&self, slot: usize) {
        self.slots[slot].store(FREE, Ordering::SeqCst);
    }
}

/// An outstanding insert. Completes on drop.
#[derive(Debug)]
pub struct CommitTicket<'a> {
    gate: &'a CommitGate,
    seq: u64,
    slot: usize,
}

impl CommitTicket<'_> {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl Drop for CommitTicket<'_> {
    fn drop(&mut self) {
        self.gate.complete(self.slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watermark_waits_for_oldest_in_flight() {
        let gate = CommitGate::new();
        assert_eq!(gate.watermark(), 0);

        let a = gate.begin();
        let b = gate.begin();
        assert_eq!((a.seq(), b.seq()), (1, 2));
        assert_eq!(gate.watermark(), 0);

        drop(b);
        // 2 is done but 1 is still outstanding.
        assert_eq!(gate.watermark(), 0);

        drop(a);
        assert_eq!(gate.watermark(), 2);
    }

    #[test]
    fn test_slots_are_reused() {
        let gate = CommitGate::new();
        let total = 3 * SLOTS as u64;
        for expected in 1..=total {
            let ticket = gate.begin();
            assert_eq!(ticket.seq(), expected);
        }
        assert_eq!(gate.watermark(), total);
        assert!(gate.slots.iter().all(|s| s.load(Ordering::SeqCst) == FREE));
    }

    #[test]
    fn test_full_table_waits_for_a_release() {
        let gate = CommitGate::new();
        let mut held: Vec<_> = (0..SLOTS).map(|_| gate.begin()).collect();
        std::thread::scope(|s| {
            let waiter = s.spawn(|| gate.begin().seq());
            std::thread::sleep(std::time::Duration::from_millis(20));
            held.pop();
            assert_eq!(waiter.join().unwrap(), SLOTS as u64 + 1);
        });
        assert_eq!(gate.watermark(), 0);
        drop(held);
        assert_eq!(gate.watermark(), SLOTS as u64 + 1);
    }

    #[test]
    fn test_sequences_are_unique_across_threads() {
        let gate = CommitGate::new();
        let seqs = std::sync::Mutex::new(Vec::new());
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..100 {
                        let t = gate.begin();
                        seqs.lock().unwrap().push(t.seq());
                    }
                });
            }
        });
        let mut seqs = seqs.into_inner().unwrap();
        seqs.sort_unstable();
        seqs.dedup();
        assert_eq!(seqs.len(), 400);
        assert_eq!(gate.watermark(), 400);
    }

    #[test]
    fn test_watermark_never_passes_an_open_ticket() {
        let gate = CommitGate::new();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..500 {
                        let t = gate.begin();
                        assert!(gate.watermark() < t.seq());
                    }
                });
            }
        });
        assert_eq!(gate.watermark(), 2000);
    }
}
