//! The container tree.
//!
//! One master container owns every node. Inserts descend holding one read
//! lock at a time and write-lock only the destination leaf. Readers enter
//! nodes through [`ActiveGuard`]s so removal can see in-flight traversals,
//! and any reader that finds itself under a retired node reads it as empty.
//! Removal locks the parents it detaches from in path order, which is the
//! only place more than one lock is held at once.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lad_common::{ClientId, Error, Record, Result};
use lad_config::{DeltaStart, StoreConfig};
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::capability::{
    AgeOutReport, DeltaQueryable, EvictStep, Queryable, Reapable, Summarizable,
};
use crate::cursor::{DeltaCursor, DeltaCursorTable};
use crate::leaf::{LeafEntry, LeafInsert, LeafPolicy, TimeSeriesLeaf};
use crate::node::{ActiveGuard, ContainerNode, NodeSnapshot};
use crate::path::{DataPath, ScopePath, Segment, PATH_DEPTH};
use crate::predicate::{MatchState, SearchPredicate};
use crate::query::{DeltaResult, LeafRecords, QueryOptions, QueryResult};
use crate::sequence::CommitGate;
use crate::stats::{StatsSnapshot, StoreStats};
use crate::subscription::SubscriptionRegistry;
use crate::summary::Summary;
use crate::sync::{lock, read, try_write, write};

/// What happened to an inserted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InsertOutcome {
    /// Buffered under commit sequence `seq`; `evicted` older records were
    /// dropped by the leaf bounds.
    Stored { seq: u64, evicted: usize },
    /// Same identifier, primary time and payload already buffered.
    Duplicate,
    /// Older than the leaf bounds allow.
    Stale,
}

impl InsertOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, InsertOutcome::Stored { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoveReport {
    /// Subtrees detached, by path.
    pub scopes: Vec<String>,
    pub removed_nodes: usize,
    pub removed_records: usize,
    pub forced: bool,
    /// Traversals that were inside removed subtrees when they were detached.
    pub overridden_readers: usize,
}

/// A subtree selected for removal.
struct Target {
    parent: Arc<ContainerNode>,
    parent_path: Vec<Segment>,
    segment: Segment,
    node: Arc<ContainerNode>,
}

impl Target {
    fn path(&self) -> Vec<Segment> {
        let mut path = self.parent_path.clone();
        path.push(self.segment.clone());
        path
    }
}

fn display_path(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(Segment::to_string)
        .collect::<Vec<_>>()
        .join("/")
}

/// Handle to one leaf for the reaper's pressure pass.
#[derive(Debug, Clone)]
pub struct LeafHandle {
    node: Arc<ContainerNode>,
}

#[derive(Debug)]
pub struct ContainerTree {
    root: Arc<ContainerNode>,
    config: StoreConfig,
    policy: LeafPolicy,
    gate: CommitGate,
    cursors: DeltaCursorTable,
    subscriptions: SubscriptionRegistry,
    stats: StoreStats,
}

impl Default for ContainerTree {
    fn default() -> Self {
        ContainerTree::new(StoreConfig::default())
    }
}

impl ContainerTree {
    pub fn new(config: StoreConfig) -> Self {
        ContainerTree {
            root: ContainerNode::root(),
            policy: LeafPolicy::from_config(&config),
            config,
            gate: CommitGate::new(),
            cursors: DeltaCursorTable::new(),
            subscriptions: SubscriptionRegistry::new(),
            stats: StoreStats::default(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Place a record under `host / session / kind / identifier`, creating
    /// the path as needed.
    ///
    /// Fails only when the record cannot be placed (empty host or
    /// identifier). Duplicates and records too old for the leaf bounds are
    /// reported, not errors.
    pub fn insert(&self, record: Record) -> Result<InsertOutcome> {
        let path = DataPath::for_record(&record)?;
        let time = record.primary_time(self.config.primary_time);
        let digest = record.payload.digest();
        let record = Arc::new(record);
        let ticket = self.gate.begin();

        loop {
            // A retired node on the way down means a removal raced us; the
            // next attempt builds a fresh path.
            let Some(node) = self.resolve_leaf(&path) else {
                continue;
            };
            let lock = node
                .leaf()
                .ok_or_else(|| Error::InvalidScope(path.to_string()))?;
            let mut leaf = write(lock);
            if node.is_retired() {
                continue;
            }

            let entry = LeafEntry {
                time,
                seq: ticket.seq(),
                digest,
                record: Arc::clone(&record),
            };
            let outcome = match leaf.insert(entry, &self.policy) {
                LeafInsert::Stored { evicted } => {
                    self.stats.stored(evicted);
                    InsertOutcome::Stored {
                        seq: ticket.seq(),
                        evicted,
                    }
                }
                LeafInsert::Duplicate => {
                    self.stats.duplicate();
                    InsertOutcome::Duplicate
                }
                LeafInsert::Stale => {
                    self.stats.stale();
                    InsertOutcome::Stale
                }
            };
            drop(leaf);
            trace!(path = %path, outcome = ?outcome, "insert");
            return Ok(outcome);
        }
    }

    fn resolve_leaf(&self, path: &DataPath) -> Option<Arc<ContainerNode>> {
        let mut node = Arc::clone(&self.root);
        for segment in path.segments() {
            node = node.child_or_create(segment)?;
        }
        Some(node)
    }

    /// Visit every leaf matching `predicate`, holding one node lock at a time.
    fn walk<F>(&self, predicate: &SearchPredicate, mut visit: F)
    where
        F: FnMut(DataPath, &TimeSeriesLeaf),
    {
        let state = predicate.admits(&[]);
        if state == MatchState::No {
            return;
        }
        let root = self.root.enter();
        descend(
            &root,
            state == MatchState::Yes,
            predicate,
            &mut Vec::with_capacity(PATH_DEPTH),
            &mut Vec::with_capacity(PATH_DEPTH),
            &mut visit,
        );
    }

    /// Detach every subtree matching `predicate`.
    ///
    /// Without `force`, any matched subtree with a traversal in progress or
    /// an overlapping subscription fails the whole call with
    /// [`Error::Conflict`] and nothing is removed. With `force`, readers
    /// still inside a removed subtree see it as empty.
    pub fn remove(&self, predicate: &SearchPredicate, force: bool) -> Result<RemoveReport> {
        let mut targets = Vec::new();
        collect_targets(
            &self.root,
            predicate,
            &mut Vec::with_capacity(PATH_DEPTH),
            &mut targets,
        );
        if targets.is_empty() {
            return Ok(RemoveReport {
                forced: force,
                ..RemoveReport::default()
            });
        }

        let mut parents: BTreeMap<Vec<Segment>, Arc<ContainerNode>> = BTreeMap::new();
        for target in &targets {
            parents
                .entry(target.parent_path.clone())
                .or_insert_with(|| Arc::clone(&target.parent));
        }
        // Path order; concurrent removals lock in the same order.
        let mut guards = BTreeMap::new();
        for (path, parent) in &parents {
            if let Some(children) = parent.children() {
                guards.insert(path, write(children));
            }
        }

        let live: Vec<&Target> = targets
            .iter()
            .filter(|t| !t.parent.is_retired())
            .filter(|t| {
                guards
                    .get(&t.parent_path)
                    .and_then(|map| map.get(&t.segment))
                    .is_some_and(|current| Arc::ptr_eq(current, &t.node))
            })
            .collect();

        if !force {
            for target in &live {
                let path = target.path();
                let readers = target.node.active_readers();
                let subscriptions = self.subscriptions.overlapping(&path);
                if readers > 0 || subscriptions > 0 {
                    let scope = display_path(&path);
                    warn!(scope = %scope, readers, subscriptions, "removal refused");
                    return Err(Error::Conflict {
                        scope,
                        readers,
                        subscriptions,
                    });
                }
            }
        }

        let mut detached = Vec::with_capacity(live.len());
        let mut overridden_readers = 0;
        for target in live {
            let Some(map) = guards.get_mut(&target.parent_path) else {
                continue;
            };
            if let Some(node) = map.remove(&target.segment) {
                node.mark_retired();
                overridden_readers += node.active_readers();
                detached.push((display_path(&target.path()), node));
            }
        }
        drop(guards);

        let mut report = RemoveReport {
            forced: force,
            overridden_readers,
            ..RemoveReport::default()
        };
        for (scope, node) in detached {
            let (nodes, records) = node.retire_subtree();
            report.removed_nodes += nodes;
            report.removed_records += records;
            report.scopes.push(scope);
        }
        self.stats.removed(report.removed_records);

        debug!(
            scopes = report.scopes.len(),
            nodes = report.removed_nodes,
            records = report.removed_records,
            forced = force,
            overridden_readers,
            "removed subtrees"
        );
        Ok(report)
    }

    /// Remove everything below the master container.
    pub fn clear(&self) -> RemoveReport {
        match self.remove(&SearchPredicate::All, true) {
            Ok(report) => report,
            // Forced removal does not check for conflicts.
            Err(err) => {
                warn!(error = %err, "clear failed");
                RemoveReport {
                    forced: true,
                    ..RemoveReport::default()
                }
            }
        }
    }

    /// Structural copy of the whole hierarchy for diagnostics.
    pub fn master_snapshot(&self) -> NodeSnapshot {
        self.root.snapshot()
    }

    /// Keep the subtree at `scope` marked in use until the pin is dropped.
    ///
    /// `None` when nothing is stored at `scope`.
    pub fn pin(&self, scope: &ScopePath) -> Option<ReadPin> {
        let mut lineage = vec![self.root.enter()];
        for segment in scope.segments() {
            let child = lineage.last()?.child(segment)?;
            lineage.push(child.enter());
        }
        Some(ReadPin {
            scope: scope.clone(),
            lineage,
        })
    }

    pub fn subscribe(&self, client: &ClientId, scope: ScopePath) -> bool {
        self.subscriptions.subscribe(client, scope)
    }

    pub fn unsubscribe(&self, client: &ClientId, scope: &ScopePath) -> bool {
        self.subscriptions.unsubscribe(client, scope)
    }

    pub fn unsubscribe_all(&self, client: &ClientId) -> usize {
        self.subscriptions.unsubscribe_all(client)
    }

    pub fn subscriptions(&self, client: &ClientId) -> Vec<ScopePath> {
        self.subscriptions.scopes_for(client)
    }

    pub fn cursor(&self, client: &ClientId, scope: &ScopePath) -> Option<DeltaCursor> {
        self.cursors.get(client, scope)
    }

    /// Commit watermark: every insert with a sequence at or below it has
    /// finished.
    pub fn watermark(&self) -> u64 {
        self.gate.watermark()
    }

    fn for_each_leaf_node(&self, mut f: impl FnMut(&Arc<ContainerNode>)) {
        fn walk_nodes(node: &Arc<ContainerNode>, f: &mut dyn FnMut(&Arc<ContainerNode>)) {
            for child in node.children_snapshot() {
                if child.is_leaf() {
                    f(&child);
                } else {
                    walk_nodes(&child, f);
                }
            }
        }
        walk_nodes(&self.root, &mut f);
    }
}

fn descend<F>(
    node: &ActiveGuard,
    decided: bool,
    predicate: &SearchPredicate,
    prefix: &mut Vec<Segment>,
    lineage: &mut Vec<Arc<ContainerNode>>,
    visit: &mut F,
) where
    F: FnMut(DataPath, &TimeSeriesLeaf),
{
    if node.is_retired() || lineage.iter().any(|n| n.is_retired()) {
        return;
    }

    if let Some(lock) = node.leaf() {
        let leaf = read(lock);
        if node.is_retired() {
            return;
        }
        let path = DataPath::from_trusted(prefix.clone());
        if decided || predicate.matches(&path, &leaf.summary()) {
            visit(path, &leaf);
        }
        return;
    }

    let children = node.enter_children(|segment| {
        if decided {
            return Some(true);
        }
        prefix.push(segment.clone());
        let state = predicate.admits(prefix.as_slice());
        prefix.pop();
        match state {
            MatchState::No => None,
            MatchState::Yes => Some(true),
            MatchState::Maybe => Some(false),
        }
    });

    lineage.push(Arc::clone(node));
    for (child, child_decided) in children {
        let Some(segment) = child.segment() else {
            continue;
        };
        prefix.push(segment.clone());
        descend(&child, child_decided, predicate, prefix, lineage, visit);
        prefix.pop();
    }
    lineage.pop();
}

fn collect_targets(
    node: &Arc<ContainerNode>,
    predicate: &SearchPredicate,
    prefix: &mut Vec<Segment>,
    out: &mut Vec<Target>,
) {
    for child in node.children_snapshot() {
        let Some(segment) = child.segment().cloned() else {
            continue;
        };
        prefix.push(segment.clone());
        let selected = match predicate.admits(prefix.as_slice()) {
            MatchState::Yes => true,
            MatchState::No => false,
            MatchState::Maybe => match child.leaf() {
                Some(lock) => {
                    let summary = read(lock).summary();
                    predicate.matches(&DataPath::from_trusted(prefix.clone()), &summary)
                }
                None => {
                    collect_targets(&child, predicate, prefix, out);
                    false
                }
            },
        };
        prefix.pop();
        if selected {
            out.push(Target {
                parent: Arc::clone(node),
                parent_path: prefix.clone(),
                segment,
                node: child,
            });
        }
    }
}

fn latest_records(
    options: &QueryOptions,
    path: DataPath,
    leaf: &TimeSeriesLeaf,
) -> Option<LeafRecords> {
    let records = leaf.latest(options.limit, options.since, options.until);
    (!records.is_empty()).then_some(LeafRecords { path, records })
}

impl Queryable for ContainerTree {
    fn query(&self, predicate: &SearchPredicate, options: &QueryOptions) -> QueryResult {
        if options.limit == 0 {
            return QueryResult::default();
        }
        let mut leaves = Vec::new();
        self.walk(predicate, |path, leaf| {
            leaves.extend(latest_records(options, path, leaf))
        });
        debug!(leaves = leaves.len(), limit = options.limit, "query");
        QueryResult { leaves }
    }
}

impl DeltaQueryable for ContainerTree {
    fn delta_query(
        &self,
        client: &ClientId,
        scope: &ScopePath,
        predicate: &SearchPredicate,
    ) -> DeltaResult {
        let cursor = self.cursors.cursor(client, scope);
        // Held for the whole call: one delta query per (client, scope) at a time.
        let mut cursor = lock(&cursor);

        let watermark = self.gate.watermark();
        let first_call = !cursor.is_primed();
        let after = match cursor.watermark {
            Some(previous) => previous,
            None => match self.config.delta_start {
                DeltaStart::Snapshot => 0,
                DeltaStart::Empty => watermark,
            },
        };

        let mut leaves = Vec::new();
        let mut newest: Option<DateTime<Utc>> = None;
        if after < watermark {
            let scoped = SearchPredicate::scope(scope).and(predicate.clone());
            self.walk(&scoped, |path, leaf| {
                let entries = leaf.committed_between(after, watermark);
                if entries.is_empty() {
                    return;
                }
                newest = newest.max(entries.iter().map(|e| e.time).max());
                leaves.push(LeafRecords {
                    path,
                    records: entries.iter().map(|e| Arc::clone(&e.record)).collect(),
                });
            });
        }
        cursor.advance(watermark, newest);

        let result = DeltaResult {
            client: client.clone(),
            scope: scope.clone(),
            first_call,
            watermark,
            last_seen_timestamp: cursor.last_seen_timestamp,
            leaves,
        };
        debug!(
            client = %client,
            scope = %scope,
            records = result.len(),
            watermark,
            first_call,
            "delta query"
        );
        result
    }

    fn reset_cursor(&self, client: &ClientId, scope: &ScopePath) -> bool {
        self.cursors.reset(client, scope)
    }

    fn forget_client(&self, client: &ClientId) -> usize {
        self.cursors.forget_client(client)
    }
}

impl Summarizable for ContainerTree {
    fn summarize(&self, predicate: &SearchPredicate) -> Summary {
        let mut total = Summary::empty();
        self.walk(predicate, |_, leaf| total = total.fold(leaf.summary()));
        total
    }
}

impl Reapable for ContainerTree {
    type Candidate = LeafHandle;

    fn age_out(&self, cutoff: DateTime<Utc>) -> AgeOutReport {
        let mut report = AgeOutReport::default();
        self.for_each_leaf_node(|node| {
            let Some(lock) = node.leaf() else {
                return;
            };
            let Some(mut leaf) = try_write(lock) else {
                report.leaves_skipped += 1;
                return;
            };
            if node.is_retired() {
                return;
            }
            let dropped = leaf.drain_older_than(cutoff);
            if dropped > 0 {
                self.stats.aged_out(dropped);
                report.records += dropped;
            }
        });
        report
    }

    fn eviction_candidates(&self) -> Vec<(DateTime<Utc>, LeafHandle)> {
        let mut out = Vec::new();
        self.for_each_leaf_node(|node| {
            let Some(lock) = node.leaf() else {
                return;
            };
            if let Some(oldest) = read(lock).oldest_time() {
                out.push((
                    oldest,
                    LeafHandle {
                        node: Arc::clone(node),
                    },
                ));
            }
        });
        out
    }

    fn evict_oldest(
        &self,
        candidate: &LeafHandle,
        protect_after: Option<DateTime<Utc>>,
    ) -> EvictStep {
        let Some(lock) = candidate.node.leaf() else {
            return EvictStep::Empty;
        };
        let Some(mut leaf) = try_write(lock) else {
            return EvictStep::Busy;
        };
        if candidate.node.is_retired() {
            return EvictStep::Empty;
        }
        let Some(oldest) = leaf.oldest_time() else {
            return EvictStep::Empty;
        };
        if protect_after.is_some_and(|bound| oldest >= bound) {
            return EvictStep::Protected;
        }
        leaf.pop_oldest();
        self.stats.pressure_evicted(1);
        EvictStep::Evicted {
            next_oldest: leaf.oldest_time(),
        }
    }

    fn prune_empty(&self) -> usize {
        let pruned = prune_below(&self.root);
        self.stats.pruned(pruned);
        pruned
    }

    fn record_count(&self) -> u64 {
        self.stats.stored_records()
    }
}

/// Bottom-up removal of empty nodes. Skips anything locked or in use.
fn prune_below(node: &ContainerNode) -> usize {
    let mut pruned = 0;
    for child in node.children_snapshot() {
        if !child.is_leaf() {
            pruned += prune_below(&child);
        }
    }
    let Some(lock) = node.children() else {
        return pruned;
    };
    let Some(mut map) = try_write(lock) else {
        return pruned;
    };
    if node.is_retired() {
        return pruned;
    }
    map.retain(|_, child| {
        let gone = child.retire_if_empty();
        if gone {
            pruned += 1;
        }
        !gone
    });
    pruned
}

/// Holds a subtree in use for a streaming reader.
///
/// While a pin is alive, a non-forced removal of its subtree (or any
/// ancestor) is refused. After a forced removal the pin reads as empty.
#[derive(Debug)]
pub struct ReadPin {
    scope: ScopePath,
    /// Root first, pinned node last.
    lineage: Vec<ActiveGuard>,
}

impl ReadPin {
    pub fn scope(&self) -> &ScopePath {
        &self.scope
    }

    pub fn is_retired(&self) -> bool {
        self.lineage.iter().any(|node| node.is_retired())
    }

    pub fn summary(&self) -> Summary {
        match self.lineage.last() {
            Some(node) if !self.is_retired() => node.summary(),
            _ => Summary::empty(),
        }
    }

    /// Latest records of every leaf under the pinned node.
    pub fn records(&self, options: &QueryOptions) -> QueryResult {
        let Some((target, ancestors)) = self.lineage.split_last() else {
            return QueryResult::default();
        };
        if options.limit == 0 || self.is_retired() {
            return QueryResult::default();
        }
        let mut lineage: Vec<Arc<ContainerNode>> =
            ancestors.iter().map(|guard| Arc::clone(guard)).collect();
        let mut prefix = self.scope.segments().to_vec();
        let mut leaves = Vec::new();
        descend(
            target,
            true,
            &SearchPredicate::All,
            &mut prefix,
            &mut lineage,
            &mut |path, leaf: &TimeSeriesLeaf| leaves.extend(latest_records(options, path, leaf)),
        );
        QueryResult { leaves }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lad_common::{DataKind, Payload, Provenance, SessionKey, TimeSet, TypedValue, VenueId};

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

    fn times(result: &QueryResult) -> Vec<i64> {
        result.records().map(|r| r.times.ert.timestamp()).collect()
    }

    #[test]
    fn test_latest_value_after_out_of_order_arrival() {
        let tree = ContainerTree::default();
        for secs in [10, 5, 20] {
            tree.insert(record("h", "A", secs, secs)).unwrap();
        }
        let a = SearchPredicate::identifier("A");
        assert_eq!(times(&tree.query(&a, &QueryOptions::latest())), vec![20]);
        assert_eq!(times(&tree.query(&a, &QueryOptions::limit(3))), vec![5, 10, 20]);
    }

    #[test]
    fn test_insert_rejects_empty_identifier() {
        let tree = ContainerTree::default();
        let err = tree.insert(record("h", "", 1, 1)).unwrap_err();
        assert_eq!(err.code(), 20);
        assert_eq!(tree.stats().inserted, 0);
    }

    #[test]
    fn test_duplicate_insert_keeps_one() {
        let tree = ContainerTree::default();
        assert!(tree.insert(record("h", "A", 1, 7)).unwrap().is_stored());
        assert_eq!(
            tree.insert(record("h", "A", 1, 7)).unwrap(),
            InsertOutcome::Duplicate
        );
        assert_eq!(tree.record_count(), 1);
        assert_eq!(tree.stats().duplicates, 1);
    }

    #[test]
    fn test_query_prunes_by_host() {
        let tree = ContainerTree::default();
        tree.insert(record("h1", "A", 1, 1)).unwrap();
        tree.insert(record("h2", "A", 2, 2)).unwrap();
        let result = tree.query(&SearchPredicate::host("h2"), &QueryOptions::latest());
        assert_eq!(result.leaves.len(), 1);
        assert_eq!(result.leaves[0].path.to_string(), "h2/1-0/channel/A");
    }

    #[test]
    fn test_json_numeric_segment_finds_text_identifier() {
        let tree = ContainerTree::default();
        tree.insert(record("h", "42", 1, 1)).unwrap();
        tree.insert(record("h", "43", 1, 1)).unwrap();

        let predicate: SearchPredicate = serde_json::from_str(
            r#"{"op":"segment","level":"identifier","value":42}"#,
        )
        .unwrap();
        let result = tree.query(&predicate, &QueryOptions::latest());
        assert_eq!(result.len(), 1);
        assert_eq!(result.leaves[0].path.to_string(), "h/1-0/channel/42");
    }

    #[test]
    fn test_query_limit_zero_and_no_match() {
        let tree = ContainerTree::default();
        tree.insert(record("h", "A", 1, 1)).unwrap();
        assert!(tree
            .query(&SearchPredicate::All, &QueryOptions::limit(0))
            .is_empty());
        assert!(tree
            .query(&SearchPredicate::host("nope"), &QueryOptions::latest())
            .is_empty());
    }

    #[test]
    fn test_summarize_folds_leaves() {
        let tree = ContainerTree::default();
        tree.insert(record("h", "A", 5, 1)).unwrap();
        tree.insert(record("h", "A", 9, 2)).unwrap();
        tree.insert(record("h", "B", 3, 1)).unwrap();
        let s = tree.summarize(&SearchPredicate::All);
        assert_eq!(s.count, 3);
        assert_eq!(s.distinct_identifiers, 2);
        assert_eq!(s.earliest, Some(ts(3)));
        assert_eq!(s.latest, Some(ts(9)));

        let recent = tree.summarize(&SearchPredicate::UpdatedSince { since: ts(4) });
        assert_eq!(recent.distinct_identifiers, 1);
    }

    #[test]
    fn test_delta_returns_each_record_once() {
        let tree = ContainerTree::default();
        let client = ClientId::new("c");
        let scope = ScopePath::root();
        tree.insert(record("h", "A", 10, 1)).unwrap();

        let first = tree.delta_query(&client, &scope, &SearchPredicate::All);
        assert!(first.first_call);
        assert_eq!(first.len(), 1);

        // Older timestamp than anything returned so far, still delivered.
        tree.insert(record("h", "A", 5, 2)).unwrap();
        let second = tree.delta_query(&client, &scope, &SearchPredicate::All);
        assert!(!second.first_call);
        assert_eq!(second.len(), 1);
        assert_eq!(second.last_seen_timestamp, Some(ts(10)));

        assert!(tree
            .delta_query(&client, &scope, &SearchPredicate::All)
            .is_empty());
    }

    #[test]
    fn test_delta_empty_start() {
        let config = StoreConfig::default().with_delta_start(DeltaStart::Empty);
        let tree = ContainerTree::new(config);
        let client = ClientId::new("c");
        tree.insert(record("h", "A", 1, 1)).unwrap();
        let first = tree.delta_query(&client, &ScopePath::root(), &SearchPredicate::All);
        assert!(first.is_empty());
        tree.insert(record("h", "A", 2, 2)).unwrap();
        let next = tree.delta_query(&client, &ScopePath::root(), &SearchPredicate::All);
        assert_eq!(next.len(), 1);
    }

    #[test]
    fn test_delta_reset_replays_snapshot() {
        let tree = ContainerTree::default();
        let client = ClientId::new("c");
        let scope = ScopePath::parse("h").unwrap();
        tree.insert(record("h", "A", 1, 1)).unwrap();
        tree.delta_query(&client, &scope, &SearchPredicate::All);
        assert!(tree.reset_cursor(&client, &scope));
        let again = tree.delta_query(&client, &scope, &SearchPredicate::All);
        assert!(again.first_call);
        assert_eq!(again.len(), 1);
        assert_eq!(tree.forget_client(&client), 1);
        assert!(tree.cursor(&client, &scope).is_none());
    }

    #[test]
    fn test_remove_conflicts_with_pin_unless_forced() {
        let tree = ContainerTree::default();
        tree.insert(record("h1", "A", 1, 1)).unwrap();
        tree.insert(record("h2", "A", 1, 1)).unwrap();
        let pin = tree.pin(&ScopePath::parse("h1").unwrap()).unwrap();

        let err = tree.remove(&SearchPredicate::host("h1"), false).unwrap_err();
        assert!(matches!(err, Error::Conflict { readers: 1, .. }));
        assert_eq!(pin.records(&QueryOptions::latest()).len(), 1);

        // Unrelated host is not blocked.
        let other = tree.remove(&SearchPredicate::host("h2"), false).unwrap();
        assert_eq!(other.removed_records, 1);

        let forced = tree.remove(&SearchPredicate::host("h1"), true).unwrap();
        assert_eq!(forced.overridden_readers, 1);
        assert!(pin.is_retired());
        assert!(pin.records(&QueryOptions::latest()).is_empty());
        assert_eq!(tree.record_count(), 0);
    }

    #[test]
    fn test_remove_conflicts_with_subscription() {
        let tree = ContainerTree::default();
        let client = ClientId::new("c");
        tree.insert(record("h", "A", 1, 1)).unwrap();
        tree.subscribe(&client, ScopePath::parse("h/1-0/channel/A").unwrap());
        let err = tree.remove(&SearchPredicate::host("h"), false).unwrap_err();
        assert!(matches!(err, Error::Conflict { subscriptions: 1, .. }));
        tree.unsubscribe_all(&client);
        assert_eq!(
            tree.remove(&SearchPredicate::host("h"), false)
                .unwrap()
                .removed_nodes,
            4
        );
    }

    #[test]
    fn test_clear_keeps_master() {
        let tree = ContainerTree::default();
        tree.insert(record("h1", "A", 1, 1)).unwrap();
        tree.insert(record("h2", "B", 1, 1)).unwrap();
        let report = tree.clear();
        assert_eq!(report.removed_records, 2);
        let snap = tree.master_snapshot();
        assert!(snap.children.is_empty());
        // Tree is usable afterwards.
        tree.insert(record("h1", "A", 2, 2)).unwrap();
        assert_eq!(tree.record_count(), 1);
    }

    #[test]
    fn test_reap_primitives() {
        let tree = ContainerTree::default();
        tree.insert(record("h", "A", 1, 1)).unwrap();
        tree.insert(record("h", "A", 2, 2)).unwrap();
        tree.insert(record("h", "B", 3, 3)).unwrap();

        assert_eq!(tree.age_out(ts(2)).records, 1);
        let candidates = tree.eviction_candidates();
        assert_eq!(candidates.len(), 2);
        let (oldest, handle) = candidates.iter().min_by_key(|(t, _)| *t).unwrap();
        assert_eq!(*oldest, ts(2));

        assert_eq!(tree.evict_oldest(handle, Some(ts(2))), EvictStep::Protected);
        assert_eq!(
            tree.evict_oldest(handle, None),
            EvictStep::Evicted { next_oldest: None }
        );
        assert_eq!(tree.evict_oldest(handle, None), EvictStep::Empty);

        // Leaf A and nothing else is empty.
        assert_eq!(tree.prune_empty(), 1);
        assert_eq!(tree.record_count(), 1);
        assert_eq!(tree.stats().pressure_evicted, 1);
    }
}
