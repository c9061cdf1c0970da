//! Client subscriptions registered against subtrees.
//!
//! A subscription does not receive pushes from the store; it marks a scope
//! as in use so that a non-forced removal overlapping it is refused.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use lad_common::ClientId;

use crate::path::{ScopePath, Segment};
use crate::sync::{read, write};

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    scopes: RwLock<HashMap<ClientId, BTreeSet<ScopePath>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        SubscriptionRegistry::default()
    }

    /// Returns false if the client already held this scope.
    pub fn subscribe(&self, client: &ClientId, scope: ScopePath) -> bool {
        write(&self.scopes)
            .entry(client.clone())
            .or_default()
            .insert(scope)
    }

    pub fn unsubscribe(&self, client: &ClientId, scope: &ScopePath) -> bool {
        let mut scopes = write(&self.scopes);
        let Some(held) = scopes.get_mut(client) else {
            return false;
        };
        let removed = held.remove(scope);
        if held.is_empty() {
            scopes.remove(client);
        }
        removed
    }

    pub fn unsubscribe_all(&self, client: &ClientId) -> usize {
        write(&self.scopes).remove(client).map_or(0, |held| held.len())
    }

    /// Subscriptions whose scope contains, or lies inside, `path`.
    pub fn overlapping(&self, path: &[Segment]) -> usize {
        read(&self.scopes)
            .values()
            .flatten()
            .filter(|scope| scope.overlaps(path))
            .count()
    }

    pub fn scopes_for(&self, client: &ClientId) -> Vec<ScopePath> {
        read(&self.scopes)
            .get(client)
            .map(|held| held.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        read(&self.scopes).values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
