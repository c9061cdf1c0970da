//! Property-based tests for leaf bounds, query ordering, and delta delivery.

use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use lad_common::{
    ClientId, DataKind, Payload, Provenance, Record, SessionKey, TimeSet, TypedValue, VenueId,
};
use lad_config::StoreConfig;
use lad_store::prelude::*;
use lad_store::{ContainerTree, QueryOptions, ScopePath, SearchPredicate};
use proptest::prelude::*;

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn record(host: &str, id: &str, secs: i64, value: i64) -> Record {
    Record::new(
        id,
        DataKind::Channel,
        TimeSet::at_ert(ts(secs)),
        Payload::Value(TypedValue::Int(value)),
        Provenance {
            host: host.into(),
            venue: VenueId::from("test"),
            session: SessionKey::new(1, 0),
            realtime: true,
        },
    )
}

fn key(r: &Record) -> (String, String, i64, String) {
    (
        r.provenance.host.clone(),
        r.identifier.clone(),
        r.times.ert.timestamp(),
        r.payload.to_json().to_string(),
    )
}

proptest! {
    #[test]
    fn leaf_stays_bounded_and_sorted(
        times in prop::collection::vec(0i64..1_000, 1..200),
        max_count in 1usize..20,
    ) {
        let tree = ContainerTree::new(StoreConfig::default().with_leaf_max_count(max_count));
        for (i, secs) in times.iter().enumerate() {
            tree.insert(record("h", "A", *secs, i as i64)).unwrap();
        }
        let result = tree.query(&SearchPredicate::All, &QueryOptions::all());
        let stored: Vec<i64> = result.records().map(|r| r.times.ert.timestamp()).collect();

        prop_assert!(stored.len() <= max_count);
        prop_assert!(stored.windows(2).all(|w| w[0] <= w[1]));
        // The newest time ever offered is never the one rejected or evicted.
        prop_assert_eq!(stored.last().copied(), times.iter().copied().max());
    }

    #[test]
    fn latest_query_returns_newest_per_leaf(
        inserts in prop::collection::vec((0usize..4, 0i64..500), 1..100),
    ) {
        let ids = ["A", "B", "C", "D"];
        let tree = ContainerTree::default();
        for (i, (id, secs)) in inserts.iter().enumerate() {
            tree.insert(record("h", ids[*id], *secs, i as i64)).unwrap();
        }
        let result = tree.query(&SearchPredicate::All, &QueryOptions::latest());
        for leaf in &result.leaves {
            prop_assert_eq!(leaf.records.len(), 1);
            let id = leaf.records[0].identifier.as_str();
            let newest = inserts
                .iter()
                .filter(|(i, _)| ids[*i] == id)
                .map(|(_, s)| *s)
                .max();
            prop_assert_eq!(Some(leaf.records[0].times.ert.timestamp()), newest);
        }
        let distinct: HashSet<usize> = inserts.iter().map(|(i, _)| *i).collect();
        prop_assert_eq!(result.leaves.len(), distinct.len());
    }

    #[test]
    fn summary_agrees_with_query(
        inserts in prop::collection::vec((0usize..3, 0usize..3, 0i64..100), 1..80),
    ) {
        let hosts = ["h1", "h2", "h3"];
        let ids = ["X", "Y", "Z"];
        let tree = ContainerTree::default();
        for (i, (h, id, secs)) in inserts.iter().enumerate() {
            tree.insert(record(hosts[*h], ids[*id], *secs, i as i64)).unwrap();
        }
        let predicate = SearchPredicate::host("h2");
        let summary = tree.summarize(&predicate);
        let result = tree.query(&predicate, &QueryOptions::all());
        prop_assert_eq!(summary.count as usize, result.len());
        prop_assert_eq!(
            summary.latest,
            result.records().map(|r| r.times.ert).max()
        );
    }

    #[test]
    fn deltas_deliver_every_record_exactly_once(
        batches in prop::collection::vec(prop::collection::vec((0usize..3, 0i64..1_000), 0..20), 1..10),
    ) {
        let ids = ["A", "B", "C"];
        let tree = ContainerTree::new(StoreConfig::default().with_leaf_max_count(10_000));
        let client = ClientId::new("prop");
        let scope = ScopePath::root();

        let mut inserted = HashSet::new();
        let mut delivered = Vec::new();
        let mut n = 0i64;
        for batch in &batches {
            for (id, secs) in batch {
                let r = record("h", ids[*id], *secs, n);
                n += 1;
                inserted.insert(key(&r));
                tree.insert(r).unwrap();
            }
            let delta = tree.delta_query(&client, &scope, &SearchPredicate::All);
            delivered.extend(delta.records().map(|r| key(r)));
        }
        let tail = tree.delta_query(&client, &scope, &SearchPredicate::All);
        prop_assert!(tail.is_empty());

        let unique: HashSet<_> = delivered.iter().cloned().collect();
        prop_assert_eq!(unique.len(), delivered.len());
        prop_assert_eq!(unique, inserted);
    }
}
