//! Per-client delta cursors.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use lad_common::ClientId;
use serde::Serialize;

use crate::path::ScopePath;
use crate::sync::{lock, read, write};

/// High-water mark for one (client, scope) pair.
///
/// Only the delta query holding the cursor's lock mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeltaCursor {
    pub client: ClientId,
    pub scope: ScopePath,
    /// Commit watermark of the last delta query; `None` before the first.
    pub watermark: Option<u64>,
    /// Newest primary timestamp returned so far.
    pub last_seen_timestamp: Option<DateTime<Utc>>,
    pub queries: u64,
}

impl DeltaCursor {
    fn new(client: ClientId, scope: ScopePath) -> Self {
        DeltaCursor {
            client,
            scope,
            watermark: None,
            last_seen_timestamp: None,
            queries: 0,
        }
    }

    pub fn is_primed(&self) -> bool {
        self.watermark.is_some()
    }

    /// Record a completed delta query. Both marks only move forward.
    pub(crate) fn advance(&mut self, watermark: u64, newest: Option<DateTime<Utc>>) {
        self.watermark = Some(self.watermark.map_or(watermark, |w| w.max(watermark)));
        if let Some(ts) = newest {
            self.last_seen_timestamp = Some(self.last_seen_timestamp.map_or(ts, |cur| cur.max(ts)));
        }
        self.queries += 1;
    }
}

type CursorKey = (ClientId, ScopePath);

#[derive(Debug, Default)]
pub struct DeltaCursorTable {
    cursors: RwLock<HashMap<CursorKey, Arc<Mutex<DeltaCursor>>>>,
}

impl DeltaCursorTable {
    pub fn new() -> Self {
        DeltaCursorTable::default()
    }

    /// Cursor for `(client, scope)`, created unprimed on first use.
    pub(crate) fn cursor(&self, client: &ClientId, scope: &ScopePath) -> Arc<Mutex<DeltaCursor>> {
        let key = (client.clone(), scope.clone());
        if let Some(cursor) = read(&self.cursors).get(&key) {
            return Arc::clone(cursor);
        }
        let mut cursors = write(&self.cursors);
        let cursor = cursors.entry(key).or_insert_with(|| {
            Arc::new(Mutex::new(DeltaCursor::new(client.clone(), scope.clone())))
        });
        Arc::clone(cursor)
    }

    pub fn get(&self, client: &ClientId, scope: &ScopePath) -> Option<DeltaCursor> {
        let key = (client.clone(), scope.clone());
        let cursor = read(&self.cursors).get(&key).cloned()?;
        let snapshot = lock(&cursor).clone();
        Some(snapshot)
    }

    /// Rewind a cursor so the next delta query behaves like the first.
    pub fn reset(&self, client: &ClientId, scope: &ScopePath) -> bool {
        let key = (client.clone(), scope.clone());
        let Some(cursor) = read(&self.cursors).get(&key).cloned() else {
            return false;
        };
        let mut cursor = lock(&cursor);
        cursor.watermark = None;
        cursor.last_seen_timestamp = None;
        true
    }

    /// Drop every cursor owned by `client`.
    pub fn forget_client(&self, client: &ClientId) -> usize {
        let mut cursors = write(&self.cursors);
        let before = cursors.len();
        cursors.retain(|(owner, _), _| owner != client);
        before - cursors.len()
    }

    pub fn len(&self) -> usize {
        read(&self.cursors).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cursor_created_once() {
        let table = DeltaCursorTable::new();
        let client = ClientId::new("c1");
        let scope = ScopePath::parse("h").unwrap();
        let a = table.cursor(&client, &scope);
        let b = table.cursor(&client, &scope);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(table.len(), 1);
        assert!(!table.get(&client, &scope).unwrap().is_primed());
    }

    #[test]
    fn test_advance_is_monotonic() {
        let mut cursor = DeltaCursor::new(ClientId::new("c"), ScopePath::root());
        let t = |s| Utc.timestamp_opt(s, 0).unwrap();
        cursor.advance(10, Some(t(50)));
        cursor.advance(12, Some(t(40)));
        assert_eq!(cursor.watermark, Some(12));
        assert_eq!(cursor.last_seen_timestamp, Some(t(50)));
        cursor.advance(13, None);
        assert_eq!(cursor.last_seen_timestamp, Some(t(50)));
        assert_eq!(cursor.queries, 3);
    }

    #[test]
    fn test_reset_and_forget() {
        let table = DeltaCursorTable::new();
        let c1 = ClientId::new("c1");
        let c2 = ClientId::new("c2");
        let root = ScopePath::root();
        let host = ScopePath::parse("h").unwrap();

        lock(&table.cursor(&c1, &root)).advance(5, None);
        table.cursor(&c1, &host);
        table.cursor(&c2, &root);

        assert!(table.reset(&c1, &root));
        assert!(!table.get(&c1, &root).unwrap().is_primed());
        assert!(!table.reset(&ClientId::new("nobody"), &root));

        assert_eq!(table.forget_client(&c1), 2);
        assert_eq!(table.len(), 1);
    }
}
