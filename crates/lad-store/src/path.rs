//! Hierarchy paths: `host / session-fragment / data-kind / identifier`.
//!
//! Segments are opaque and compared exactly. Nothing is pattern-matched
//! while placing a record; patterns live in [`crate::predicate`].

use std::fmt;

use lad_common::{Error, Record, Result};
use serde::{Deserialize, Serialize, Serializer};

/// Number of levels below the master container.
pub const PATH_DEPTH: usize = 4;

/// Hierarchy level of a path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Host,
    Session,
    Kind,
    Identifier,
}

impl Level {
    pub const ALL: [Level; PATH_DEPTH] = [Level::Host, Level::Session, Level::Kind, Level::Identifier];

    /// Zero-based depth below the root.
    pub fn index(self) -> usize {
        match self {
            Level::Host => 0,
            Level::Session => 1,
            Level::Kind => 2,
            Level::Identifier => 3,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Host => write!(f, "host"),
            Level::Session => write!(f, "session"),
            Level::Kind => write!(f, "kind"),
            Level::Identifier => write!(f, "identifier"),
        }
    }
}

/// One opaque path segment.
///
/// Numeric segments are held in decimal text form, so `42` and `"42"`
/// name the same node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "SegmentRepr", into = "String")]
pub struct Segment(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum SegmentRepr {
    Int(i64),
    Uint(u64),
    Text(String),
}

impl From<SegmentRepr> for Segment {
    fn from(repr: SegmentRepr) -> Self {
        match repr {
            SegmentRepr::Int(v) => Segment::from(v),
            SegmentRepr::Uint(v) => Segment(v.to_string()),
            SegmentRepr::Text(s) => Segment(s),
        }
    }
}

impl From<Segment> for String {
    fn from(segment: Segment) -> Self {
        segment.0
    }
}

impl Segment {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Segment {
    fn from(s: &str) -> Self {
        Segment(s.to_string())
    }
}

impl From<String> for Segment {
    fn from(s: String) -> Self {
        Segment(s)
    }
}

impl From<i64> for Segment {
    fn from(v: i64) -> Self {
        Segment(v.to_string())
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, segments: &[Segment]) -> fmt::Result {
    for (i, seg) in segments.iter().enumerate() {
        if i > 0 {
            write!(f, "/")?;
        }
        write!(f, "{}", seg)?;
    }
    Ok(())
}

/// Full path of a leaf: exactly one segment per level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataPath {
    segments: Vec<Segment>,
}

impl DataPath {
    /// Build a path from one segment per level.
    pub fn new(segments: Vec<Segment>) -> Result<Self> {
        if segments.len() != PATH_DEPTH {
            return Err(Error::InvalidScope(format!(
                "leaf path needs {} segments, got {}",
                PATH_DEPTH,
                segments.len()
            )));
        }
        if let Some(pos) = segments.iter().position(Segment::is_empty) {
            return Err(Error::InvalidScope(format!(
                "empty {} segment",
                Level::ALL[pos]
            )));
        }
        Ok(DataPath { segments })
    }

    /// Path rebuilt from segments already validated on insert.
    pub(crate) fn from_trusted(segments: Vec<Segment>) -> Self {
        debug_assert_eq!(segments.len(), PATH_DEPTH);
        DataPath { segments }
    }

    /// Placement of a record in the hierarchy.
    pub fn for_record(record: &Record) -> Result<Self> {
        Self::new(vec![
            Segment::from(record.provenance.host.as_str()),
            Segment::from(record.provenance.session.to_string()),
            Segment::from(record.kind.as_str()),
            Segment::from(record.identifier.as_str()),
        ])
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, level: Level) -> &Segment {
        &self.segments[level.index()]
    }

    pub fn to_scope(&self) -> ScopePath {
        ScopePath {
            segments: self.segments.clone(),
        }
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_joined(f, &self.segments)
    }
}

impl Serialize for DataPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A path prefix selecting a subtree. The empty scope is the master container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopePath {
    segments: Vec<Segment>,
}

impl ScopePath {
    pub fn root() -> Self {
        ScopePath::default()
    }

    pub fn new(segments: Vec<Segment>) -> Result<Self> {
        if segments.len() > PATH_DEPTH {
            return Err(Error::InvalidScope(format!(
                "scope has {} segments, hierarchy depth is {}",
                segments.len(),
                PATH_DEPTH
            )));
        }
        if segments.iter().any(Segment::is_empty) {
            return Err(Error::InvalidScope("empty segment in scope".to_string()));
        }
        Ok(ScopePath { segments })
    }

    /// Parse `host/session/kind/identifier` (any prefix). `""` and `"/"` are the root.
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(ScopePath::root());
        }
        let segments: Vec<Segment> = trimmed.split('/').map(Segment::from).collect();
        Self::new(segments).map_err(|_| Error::InvalidScope(s.to_string()))
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Extend the scope by one level.
    pub fn child(&self, segment: impl Into<Segment>) -> Result<Self> {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self::new(segments)
    }

    /// True when one path is a prefix of the other.
    pub fn overlaps(&self, other: &[Segment]) -> bool {
        let n = self.segments.len().min(other.len());
        self.segments[..n] == other[..n]
    }
}

impl fmt::Display for ScopePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        write_joined(f, &self.segments)
    }
}

impl Serialize for ScopePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
