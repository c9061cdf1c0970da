//! Occupancy summaries folded over leaves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate over a set of leaves.
///
/// Leaves compute their own summary from their buffer; internal nodes fold
/// their children's summaries on read instead of storing a copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Records buffered.
    pub count: u64,
    /// Identifiers with at least one buffered record.
    pub distinct_identifiers: u64,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

impl Summary {
    pub fn empty() -> Self {
        Summary::default()
    }

    /// Summary of a single leaf holding `count` records.
    pub fn for_leaf(
        count: usize,
        earliest: Option<DateTime<Utc>>,
        latest: Option<DateTime<Utc>>,
    ) -> Self {
        Summary {
            count: count as u64,
            distinct_identifiers: u64::from(count > 0),
            earliest,
            latest,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Combine two summaries over disjoint leaf sets.
    pub fn fold(self, other: Summary) -> Summary {
        Summary {
            count: self.count + other.count,
            distinct_identifiers: self.distinct_identifiers + other.distinct_identifiers,
            earliest: min_opt(self.earliest, other.earliest),
            latest: max_opt(self.latest, other.latest),
        }
    }
}

impl std::iter::Sum for Summary {
    fn sum<I: Iterator<Item = Summary>>(iter: I) -> Self {
        iter.fold(Summary::empty(), Summary::fold)
    }
}

fn min_opt(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

fn max_opt(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_fold() {
        let a = Summary::for_leaf(3, Some(ts(5)), Some(ts(20)));
        let b = Summary::for_leaf(1, Some(ts(2)), Some(ts(2)));
        let folded = a.fold(b);
        assert_eq!(folded.count, 4);
        assert_eq!(folded.distinct_identifiers, 2);
        assert_eq!(folded.earliest, Some(ts(2)));
        assert_eq!(folded.latest, Some(ts(20)));
    }

    #[test]
    fn test_empty_leaf_not_counted_as_identifier() {
        let s: Summary = vec![Summary::for_leaf(0, None, None), Summary::empty()]
            .into_iter()
            .sum();
        assert!(s.is_empty());
        assert_eq!(s.distinct_identifiers, 0);
    }
}
