//! Capability traits.
//!
//! Front-ends depend on the narrowest capability they need; the reaper only
//! sees [`Reapable`]. [`crate::ContainerTree`] implements all of them.

use chrono::{DateTime, Utc};
use lad_common::ClientId;
use serde::Serialize;

use crate::path::ScopePath;
use crate::predicate::SearchPredicate;
use crate::query::{DeltaResult, QueryOptions, QueryResult};
use crate::summary::Summary;

pub trait Queryable {
    /// Up to `options.limit` most recent records of every matching leaf.
    fn query(&self, predicate: &SearchPredicate, options: &QueryOptions) -> QueryResult;
}

pub trait DeltaQueryable {
    /// Records committed under `scope` (and matching `predicate`) since the
    /// client's previous call for the same scope.
    fn delta_query(
        &self,
        client: &ClientId,
        scope: &ScopePath,
        predicate: &SearchPredicate,
    ) -> DeltaResult;

    /// Make the next delta query for `(client, scope)` behave like the first.
    fn reset_cursor(&self, client: &ClientId, scope: &ScopePath) -> bool;

    /// Drop all cursors held by `client`.
    fn forget_client(&self, client: &ClientId) -> usize;
}

pub trait Summarizable {
    fn summarize(&self, predicate: &SearchPredicate) -> Summary;
}

/// Result of an age-based pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AgeOutReport {
    pub records: usize,
    /// Leaves locked by a writer; retried next pass.
    pub leaves_skipped: usize,
}

/// Result of evicting one record from a candidate leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictStep {
    /// One record dropped; the leaf's new oldest time, if any remain.
    Evicted { next_oldest: Option<DateTime<Utc>> },
    /// Locked by a writer.
    Busy,
    /// Oldest record is inside the protected window.
    Protected,
    /// Nothing left (emptied or removed meanwhile).
    Empty,
}

/// Operations the reaper drives.
///
/// Every method touches at most one leaf lock at a time. Mutating methods
/// skip leaves held by a writer rather than wait for them.
pub trait Reapable: Send + Sync {
    type Candidate: Send;

    /// Drop every record older than `cutoff` across all leaves.
    fn age_out(&self, cutoff: DateTime<Utc>) -> AgeOutReport;

    /// Every non-empty leaf with its oldest primary time.
    fn eviction_candidates(&self) -> Vec<(DateTime<Utc>, Self::Candidate)>;

    /// Drop the oldest record of `candidate` unless it is at or after
    /// `protect_after`.
    fn evict_oldest(
        &self,
        candidate: &Self::Candidate,
        protect_after: Option<DateTime<Utc>>,
    ) -> EvictStep;

    /// Remove internal nodes left without children and empty leaves.
    fn prune_empty(&self) -> usize;

    fn record_count(&self) -> u64;
}
