//! Composable matchers over node paths and summaries.
//!
//! Predicates are evaluated top-down. [`SearchPredicate::admits`] answers
//! for a path prefix with three-valued logic so whole subtrees can be
//! accepted or pruned without descending; [`SearchPredicate::matches`] gives
//! the final answer for a leaf once its full path and summary are known.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path::{DataPath, Level, ScopePath, Segment};
use crate::summary::Summary;

/// Answer for a path prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    /// Every leaf below matches.
    Yes,
    /// No leaf below matches.
    No,
    /// Depends on deeper segments or leaf contents.
    Maybe,
}

impl MatchState {
    fn not(self) -> MatchState {
        match self {
            MatchState::Yes => MatchState::No,
            MatchState::No => MatchState::Yes,
            MatchState::Maybe => MatchState::Maybe,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SearchPredicate {
    /// Matches everything.
    #[default]
    All,
    /// Exact segment at one level.
    Segment { level: Level, value: Segment },
    /// Any segment at one level.
    AnyAt { level: Level },
    /// Segment at one level whose text form starts with `prefix`.
    Prefix { level: Level, prefix: String },
    /// Leaves whose newest record is at or after `since`.
    UpdatedSince { since: DateTime<Utc> },
    And { all: Vec<SearchPredicate> },
    Or { any: Vec<SearchPredicate> },
    Not { inner: Box<SearchPredicate> },
}

impl SearchPredicate {
    pub fn segment(level: Level, value: impl Into<Segment>) -> Self {
        SearchPredicate::Segment {
            level,
            value: value.into(),
        }
    }

    pub fn host(host: &str) -> Self {
        Self::segment(Level::Host, host)
    }

    pub fn identifier(identifier: &str) -> Self {
        Self::segment(Level::Identifier, identifier)
    }

    pub fn prefix(level: Level, prefix: impl Into<String>) -> Self {
        SearchPredicate::Prefix {
            level,
            prefix: prefix.into(),
        }
    }

    /// Exactly one leaf.
    pub fn identity(path: &DataPath) -> Self {
        Self::scope(&path.to_scope())
    }

    /// Every leaf under `scope`.
    pub fn scope(scope: &ScopePath) -> Self {
        if scope.is_root() {
            return SearchPredicate::All;
        }
        SearchPredicate::And {
            all: scope
                .segments()
                .iter()
                .zip(Level::ALL)
                .map(|(seg, level)| Self::segment(level, seg.clone()))
                .collect(),
        }
    }

    pub fn and(self, other: SearchPredicate) -> Self {
        match self {
            SearchPredicate::And { mut all } => {
                all.push(other);
                SearchPredicate::And { all }
            }
            first => SearchPredicate::And {
                all: vec![first, other],
            },
        }
    }

    pub fn or(self, other: SearchPredicate) -> Self {
        match self {
            SearchPredicate::Or { mut any } => {
                any.push(other);
                SearchPredicate::Or { any }
            }
            first => SearchPredicate::Or {
                any: vec![first, other],
            },
        }
    }

    pub fn negate(self) -> Self {
        SearchPredicate::Not {
            inner: Box::new(self),
        }
    }

    /// Evaluate against a path prefix (root is the empty prefix).
    pub fn admits(&self, prefix: &[Segment]) -> MatchState {
        match self {
            SearchPredicate::All => MatchState::Yes,
            SearchPredicate::Segment { level, value } => match prefix.get(level.index()) {
                Some(seg) if seg == value => MatchState::Yes,
                Some(_) => MatchState::No,
                None => MatchState::Maybe,
            },
            SearchPredicate::AnyAt { level } => {
                if prefix.len() > level.index() {
                    MatchState::Yes
                } else {
                    MatchState::Maybe
                }
            }
            SearchPredicate::Prefix { level, prefix: p } => match prefix.get(level.index()) {
                Some(seg) if segment_has_prefix(seg, p) => MatchState::Yes,
                Some(_) => MatchState::No,
                None => MatchState::Maybe,
            },
            SearchPredicate::UpdatedSince { .. } => MatchState::Maybe,
            SearchPredicate::And { all } => {
                let mut state = MatchState::Yes;
                for p in all {
                    match p.admits(prefix) {
                        MatchState::No => return MatchState::No,
                        MatchState::Maybe => state = MatchState::Maybe,
                        MatchState::Yes => {}
                    }
                }
                state
            }
            SearchPredicate::Or { any } => {
                let mut state = MatchState::No;
                for p in any {
                    match p.admits(prefix) {
                        MatchState::Yes => return MatchState::Yes,
                        MatchState::Maybe => state = MatchState::Maybe,
                        MatchState::No => {}
                    }
                }
                state
            }
            SearchPredicate::Not { inner } => inner.admits(prefix).not(),
        }
    }

    /// Final answer for a leaf.
    pub fn matches(&self, path: &DataPath, summary: &Summary) -> bool {
        match self {
            SearchPredicate::UpdatedSince { since } => summary.latest.is_some_and(|l| l >= *since),
            SearchPredicate::And { all } => all.iter().all(|p| p.matches(path, summary)),
            SearchPredicate::Or { any } => any.iter().any(|p| p.matches(path, summary)),
            SearchPredicate::Not { inner } => !inner.matches(path, summary),
            structural => structural.admits(path.segments()) == MatchState::Yes,
        }
    }
}

fn segment_has_prefix(seg: &Segment, prefix: &str) -> bool {
    seg.as_str().starts_with(prefix)
}
