//! Offline replay of JSONL record streams into a store.
//!
//! Each non-blank line is one serialized [`Record`]. Lines that fail to
//! parse or cannot be placed are counted and reported, never fatal.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use lad_common::{Record, Result};
use lad_store::{ContainerTree, InsertOutcome};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Rejected lines kept in the summary; the rest are only counted.
const MAX_REPORTED_ERRORS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineError {
    /// 1-based line number.
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub lines: usize,
    pub stored: usize,
    pub evicted: usize,
    pub duplicates: usize,
    pub stale: usize,
    pub rejected: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<LineError>,
}

impl ReplaySummary {
    fn reject(&mut self, line: usize, message: String) {
        warn!(line, error = %message, "rejected record");
        self.rejected += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(LineError { line, message });
        }
    }
}

/// Insert every record read from `reader` into `tree`.
///
/// Fails only on read errors.
pub fn replay_reader<R: BufRead>(reader: R, tree: &ContainerTree) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        summary.lines += 1;

        let record: Record = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                summary.reject(line_no, e.to_string());
                continue;
            }
        };
        match tree.insert(record) {
            Ok(InsertOutcome::Stored { evicted, .. }) => {
                summary.stored += 1;
                summary.evicted += evicted;
            }
            Ok(InsertOutcome::Duplicate) => summary.duplicates += 1,
            Ok(InsertOutcome::Stale) => summary.stale += 1,
            Err(e) => summary.reject(line_no, e.to_string()),
        }
    }
    debug!(lines = summary.lines, "replay stream exhausted");
    Ok(summary)
}

pub fn replay_file(path: &Path, tree: &ContainerTree) -> Result<ReplaySummary> {
    let file = File::open(path)?;
    let summary = replay_reader(BufReader::new(file), tree)?;
    info!(
        path = %path.display(),
        lines = summary.lines,
        stored = summary.stored,
        duplicates = summary.duplicates,
        stale = summary.stale,
        rejected = summary.rejected,
        "replayed records"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lad_config::StoreConfig;
    use lad_store::prelude::*;
    use lad_store::{QueryOptions, SearchPredicate};
    use std::io::Cursor;

    fn line(id: &str, ert: &str, value: i64) -> String {
        format!(
            r#"{{"identifier":"{}","kind":"channel","times":{{"ert":"{}"}},"payload":{{"value":{{"int":{}}}}},"provenance":{{"host":"gds1","venue":"test","session":{{"session_id":7,"fragment":0}}}}}}"#,
            id, ert, value
        )
    }

    #[test]
    fn test_replay_counts_outcomes() {
        let input = [
            line("A", "2026-01-01T00:00:10Z", 1),
            line("A", "2026-01-01T00:00:05Z", 2),
            String::new(),
            line("A", "2026-01-01T00:00:10Z", 1),
            "{not json".to_string(),
            line("", "2026-01-01T00:00:10Z", 3),
        ]
        .join("\n");
        let tree = ContainerTree::default();
        let summary = replay_reader(Cursor::new(input), &tree).unwrap();

        assert_eq!(summary.lines, 5);
        assert_eq!(summary.stored, 2);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.errors[0].line, 5);
        assert_eq!(summary.errors[1].line, 6);

        let latest = tree.query(&SearchPredicate::All, &QueryOptions::latest());
        assert_eq!(latest.len(), 1);
    }

    #[test]
    fn test_replay_reports_stale_when_leaf_full() {
        let input = [
            line("A", "2026-01-01T00:00:10Z", 1),
            line("A", "2026-01-01T00:00:01Z", 2),
        ]
        .join("\n");
        let tree = ContainerTree::new(StoreConfig::default().with_leaf_max_count(1));
        let summary = replay_reader(Cursor::new(input), &tree).unwrap();
        assert_eq!(summary.stored, 1);
        assert_eq!(summary.stale, 1);
        assert_eq!(tree.record_count(), 1);
    }

    #[test]
    fn test_replay_missing_file() {
        let tree = ContainerTree::default();
        let err = replay_file(Path::new("/nonexistent/records.jsonl"), &tree).unwrap_err();
        assert_eq!(err.code(), 60);
    }
}
