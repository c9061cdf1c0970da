//! No-mock concurrency tests: real threads against one shared tree.
//!
//! Covers:
//! - Delta completeness while producers insert
//! - Removal racing queries and inserts
//! - Reaper convergence under a record budget
//! - The background reaper thread

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use lad_common::{
    ClientId, DataKind, Error, Payload, Provenance, Record, SessionKey, TimeSet, TypedValue,
    VenueId,
};
use lad_config::{ReaperConfig, StoreConfig};
use lad_store::prelude::*;
use lad_store::{
    ContainerTree, MemoryThresholdChecker, PressureOutcome, QueryOptions, Reaper, ReaperHandle,
    RecordBudgetProbe, ScopePath, SearchPredicate,
};

const PRODUCERS: usize = 4;
const PER_PRODUCER: usize = 500;

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn record(host: &str, id: &str, secs: i64) -> Record {
    Record::new(
        id,
        DataKind::Channel,
        TimeSet::at_ert(ts(secs)),
        Payload::Value(TypedValue::Int(secs)),
        Provenance {
            host: host.into(),
            venue: VenueId::from("test"),
            session: SessionKey::new(1, 0),
            realtime: true,
        },
    )
}

fn big_tree() -> Arc<ContainerTree> {
    Arc::new(ContainerTree::new(
        StoreConfig::default().with_leaf_max_count(100_000),
    ))
}

#[test]
fn delta_is_complete_under_concurrent_inserts() {
    let tree = big_tree();
    let done = Arc::new(AtomicBool::new(false));
    let start = Arc::new(Barrier::new(PRODUCERS + 1));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let tree = Arc::clone(&tree);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for i in 0..PER_PRODUCER {
                    let id = format!("CH-{}", i % 7);
                    let r = record(&format!("host{}", p), &id, i as i64);
                    assert!(tree.insert(r).unwrap().is_stored());
                }
            })
        })
        .collect();

    let reader = {
        let tree = Arc::clone(&tree);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let client = ClientId::new("poller");
            let scope = ScopePath::root();
            let mut seen = Vec::new();
            loop {
                let finished = done.load(Ordering::SeqCst);
                let delta = tree.delta_query(&client, &scope, &SearchPredicate::All);
                seen.extend(delta.records().map(|r| {
                    (
                        r.provenance.host.clone(),
                        r.identifier.clone(),
                        r.times.ert.timestamp(),
                    )
                }));
                if finished {
                    return seen;
                }
                thread::yield_now();
            }
        })
    };

    start.wait();
    for p in producers {
        p.join().unwrap();
    }
    done.store(true, Ordering::SeqCst);
    let seen = reader.join().unwrap();

    let unique: HashSet<_> = seen.iter().cloned().collect();
    assert_eq!(unique.len(), seen.len(), "a record was delivered twice");
    assert_eq!(seen.len(), PRODUCERS * PER_PRODUCER);
}

fn seed_host(tree: &ContainerTree, host: &str, round: i64) {
    for i in 0..50 {
        tree.insert(record(host, &format!("S{}", i % 5), round * 100 + i))
            .unwrap();
    }
}

#[test]
fn removal_races_queries_and_inserts() {
    let tree = big_tree();
    let stop = Arc::new(AtomicBool::new(false));
    seed_host(&tree, "h1", 0);

    // Writers stay out of h1 so its count only moves on a removal.
    let writers: Vec<_> = (0..2)
        .map(|w| {
            let tree = Arc::clone(&tree);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut n = 0i64;
                while !stop.load(Ordering::Relaxed) {
                    let host = if n % 2 == 0 { "h0" } else { "h2" };
                    tree.insert(record(host, &format!("W{}", w), n)).unwrap();
                    n += 1;
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let tree = Arc::clone(&tree);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let result = tree.query(&SearchPredicate::host("h1"), &QueryOptions::all());
                    for leaf in &result.leaves {
                        assert!(leaf
                            .records
                            .windows(2)
                            .all(|w| w[0].times.ert <= w[1].times.ert));
                    }
                    let _ = tree.summarize(&SearchPredicate::All);
                }
            })
        })
        .collect();

    let h1 = SearchPredicate::host("h1");
    let started = Instant::now();
    let mut removals = 0;
    let mut conflicts = 0;
    let mut round = 0;
    while started.elapsed() < Duration::from_millis(300)
        || (conflicts == 0 && started.elapsed() < Duration::from_secs(5))
    {
        let before = tree.summarize(&h1).count;
        match tree.remove(&h1, false) {
            Ok(report) => {
                assert_eq!(report.removed_records as u64, before);
                assert_eq!(tree.summarize(&h1).count, 0);
                round += 1;
                seed_host(&tree, "h1", round);
            }
            Err(Error::Conflict { .. }) => {
                conflicts += 1;
                assert_eq!(tree.summarize(&h1).count, before);
            }
            Err(e) => panic!("unexpected removal error: {}", e),
        }
        tree.remove(&SearchPredicate::host("h2"), true).unwrap();
        removals += 1;
        thread::sleep(Duration::from_millis(2));
    }
    stop.store(true, Ordering::Relaxed);
    for t in writers.into_iter().chain(readers) {
        t.join().unwrap();
    }
    assert!(removals > 0);
    assert!(conflicts > 0, "no removal ever met an in-flight query");

    // Quiescent: the running count matches what the tree holds.
    let summary = tree.summarize(&SearchPredicate::All);
    assert_eq!(summary.count, tree.record_count());
    let all = tree.query(&SearchPredicate::All, &QueryOptions::all());
    assert_eq!(all.len() as u64, summary.count);
}

#[test]
fn reaper_converges_to_budget_keeping_newest() {
    let tree = big_tree();
    for i in 0..1_000 {
        let id = format!("CH-{}", i % 10);
        tree.insert(record("h", &id, i)).unwrap();
    }
    let probe = RecordBudgetProbe::new(Arc::clone(&tree), 1_000);
    let checker = MemoryThresholdChecker::new(Arc::new(probe), 50.0);
    let reaper = Reaper::new(Arc::clone(&tree), checker, ReaperConfig::default());

    let report = reaper.run_pass_at(ts(10_000));
    assert_eq!(report.pressure.outcome, PressureOutcome::Relieved);
    assert_eq!(tree.record_count(), 500);
    assert!(report.capacity_error().is_none());

    // Global oldest-first: exactly the 500 newest survive.
    let summary = tree.summarize(&SearchPredicate::All);
    assert_eq!(summary.earliest, Some(ts(500)));
    assert_eq!(summary.latest, Some(ts(999)));
}

#[test]
fn background_reaper_drains_concurrent_inserts() {
    let tree = big_tree();
    let probe = RecordBudgetProbe::new(Arc::clone(&tree), 100);
    let checker = MemoryThresholdChecker::new(Arc::new(probe), 50.0);
    let config = ReaperConfig {
        interval_ms: 5,
        ..ReaperConfig::default()
    };
    let handle = ReaperHandle::spawn(Reaper::new(Arc::clone(&tree), checker, config)).unwrap();

    for i in 0..2_000 {
        tree.insert(record("h", "CH-1", i)).unwrap();
    }
    let deadline = Instant::now() + Duration::from_secs(10);
    while tree.record_count() > 50 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    handle.stop();
    assert!(tree.record_count() <= 50);
    let latest = tree.query(&SearchPredicate::All, &QueryOptions::latest());
    assert_eq!(latest.records().next().map(|r| r.times.ert), Some(ts(1_999)));
}
