//! Query options and result sets.
//!
//! Results hold shared immutable records, never references into the tree,
//! so a reap or removal after the query returns cannot affect them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lad_common::{ClientId, Record};
use serde::{Deserialize, Serialize};

use crate::path::{DataPath, ScopePath};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    /// Most recent records returned per leaf.
    pub limit: usize,
    /// Only records with primary time at or after this.
    pub since: Option<DateTime<Utc>>,
    /// Only records with primary time at or before this.
    pub until: Option<DateTime<Utc>>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            limit: 1,
            since: None,
            until: None,
        }
    }
}

impl QueryOptions {
    /// The latest accepted value of each leaf.
    pub fn latest() -> Self {
        QueryOptions::default()
    }

    pub fn limit(limit: usize) -> Self {
        QueryOptions {
            limit,
            ..QueryOptions::default()
        }
    }

    /// Everything still buffered.
    pub fn all() -> Self {
        QueryOptions::limit(usize::MAX)
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }
}

/// Records from one leaf, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct LeafRecords {
    pub path: DataPath,
    pub records: Vec<Arc<Record>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    pub leaves: Vec<LeafRecords>,
}

impl QueryResult {
    /// Total records across all leaves.
    pub fn len(&self) -> usize {
        self.leaves.iter().map(|l| l.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &Arc<Record>> {
        self.leaves.iter().flat_map(|l| l.records.iter())
    }

    pub fn leaf(&self, path: &DataPath) -> Option<&LeafRecords> {
        self.leaves.iter().find(|l| &l.path == path)
    }
}

/// Records committed since a client's previous delta query.
#[derive(Debug, Clone, Serialize)]
pub struct DeltaResult {
    pub client: ClientId,
    pub scope: ScopePath,
    /// True when this call created or re-primed the cursor.
    pub first_call: bool,
    /// Commit watermark the cursor now stands at.
    pub watermark: u64,
    pub last_seen_timestamp: Option<DateTime<Utc>>,
    pub leaves: Vec<LeafRecords>,
}

impl DeltaResult {
    pub fn len(&self) -> usize {
        self.leaves.iter().map(|l| l.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &Arc<Record>> {
        self.leaves.iter().flat_map(|l| l.records.iter())
    }
}
