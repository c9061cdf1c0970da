//! Global LAD in-memory store.
//!
//! This crate provides the live-data engine behind the query front-ends:
//! - A container tree (host / session / kind / identifier) whose leaves
//!   are bounded, time-ordered buffers
//! - Latest-value and windowed queries driven by search predicates
//! - Per-client delta cursors with exactly-once delivery
//! - Predicate-driven removal that respects active readers and subscriptions
//! - A reaper enforcing retention windows and a memory threshold

pub mod capability;
pub mod cursor;
pub mod leaf;
pub mod memory;
pub mod node;
pub mod output;
pub mod path;
pub mod predicate;
pub mod query;
pub mod reaper;
pub mod sequence;
pub mod stats;
pub mod subscription;
pub mod summary;
pub mod tree;

mod sync;

pub use capability::{
    AgeOutReport, DeltaQueryable, EvictStep, Queryable, Reapable, Summarizable,
};
pub use cursor::{DeltaCursor, DeltaCursorTable};
pub use leaf::{LeafEntry, LeafInsert, LeafPolicy, TimeSeriesLeaf};
pub use memory::{
    MemoryProbe, MemorySample, MemorySource, MemoryStatus, MemoryThresholdChecker,
    ProcMemoryProbe, RecordBudgetProbe,
};
pub use node::{NodeKind, NodeSnapshot};
pub use output::{render_delta, render_query, render_record};
pub use path::{DataPath, Level, ScopePath, Segment, PATH_DEPTH};
pub use predicate::{MatchState, SearchPredicate};
pub use query::{DeltaResult, LeafRecords, QueryOptions, QueryResult};
pub use reaper::{PressureOutcome, PressureReport, ReapReport, Reaper, ReaperHandle};
pub use stats::StatsSnapshot;
pub use summary::Summary;
pub use tree::{ContainerTree, InsertOutcome, LeafHandle, ReadPin, RemoveReport};

/// Capability traits, for `use lad_store::prelude::*`.
pub mod prelude {
    pub use crate::capability::{DeltaQueryable, Queryable, Reapable, Summarizable};
}
