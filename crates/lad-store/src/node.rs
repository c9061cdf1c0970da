//! Container nodes and their locking.
//!
//! A node is either internal (children map) or a leaf (time-series buffer),
//! fixed at creation by its depth. Each body sits behind its own
//! reader-writer lock. Node identity is stable once created; only removal
//! changes structure, and a removed node is marked retired so that readers
//! still positioned inside it see it as empty.

use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::leaf::TimeSeriesLeaf;
use crate::path::{Segment, PATH_DEPTH};
use crate::summary::Summary;
use crate::sync::{read, try_write, write};

pub(crate) type Children = BTreeMap<Segment, Arc<ContainerNode>>;

#[derive(Debug)]
enum NodeBody {
    Internal(RwLock<Children>),
    Leaf(RwLock<TimeSeriesLeaf>),
}

#[derive(Debug)]
pub struct ContainerNode {
    segment: Option<Segment>,
    depth: usize,
    body: NodeBody,
    retired: AtomicBool,
    active: AtomicUsize,
}

impl ContainerNode {
    /// The master container.
    pub(crate) fn root() -> Arc<Self> {
        Arc::new(ContainerNode {
            segment: None,
            depth: 0,
            body: NodeBody::Internal(RwLock::new(Children::new())),
            retired: AtomicBool::new(false),
            active: AtomicUsize::new(0),
        })
    }

    fn child_of(segment: Segment, depth: usize) -> Arc<Self> {
        let body = if depth == PATH_DEPTH {
            NodeBody::Leaf(RwLock::new(TimeSeriesLeaf::new()))
        } else {
            NodeBody::Internal(RwLock::new(Children::new()))
        };
        Arc::new(ContainerNode {
            segment: Some(segment),
            depth,
            body,
            retired: AtomicBool::new(false),
            active: AtomicUsize::new(0),
        })
    }

    pub fn segment(&self) -> Option<&Segment> {
        self.segment.as_ref()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.body, NodeBody::Leaf(_))
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    pub(crate) fn mark_retired(&self) {
        self.retired.store(true, Ordering::Release);
    }

    /// Traversals currently positioned at or below this node.
    pub fn active_readers(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn enter(self: &Arc<Self>) -> ActiveGuard {
        self.active.fetch_add(1, Ordering::AcqRel);
        ActiveGuard {
            node: Arc::clone(self),
        }
    }

    pub(crate) fn child(&self, segment: &Segment) -> Option<Arc<ContainerNode>> {
        match &self.body {
            NodeBody::Internal(children) => read(children).get(segment).cloned(),
            NodeBody::Leaf(_) => None,
        }
    }

    /// Look up a child, creating it if missing. `None` when this node is a
    /// leaf or has been retired; the caller restarts from the root.
    pub(crate) fn child_or_create(&self, segment: &Segment) -> Option<Arc<ContainerNode>> {
        let NodeBody::Internal(children) = &self.body else {
            return None;
        };
        if let Some(child) = read(children).get(segment) {
            return Some(Arc::clone(child));
        }
        let mut map = write(children);
        if self.is_retired() {
            return None;
        }
        let child = map
            .entry(segment.clone())
            .or_insert_with(|| ContainerNode::child_of(segment.clone(), self.depth + 1));
        Some(Arc::clone(child))
    }

    /// Enter every child `select` accepts while the children map is read
    /// locked, so a concurrent removal either sees the traversal or finds
    /// the child already detached.
    pub(crate) fn enter_children<T>(
        &self,
        mut select: impl FnMut(&Segment) -> Option<T>,
    ) -> Vec<(ActiveGuard, T)> {
        match &self.body {
            NodeBody::Internal(children) => read(children)
                .iter()
                .filter_map(|(seg, child)| select(seg).map(|tag| (child.enter(), tag)))
                .collect(),
            NodeBody::Leaf(_) => Vec::new(),
        }
    }

    pub(crate) fn leaf(&self) -> Option<&RwLock<TimeSeriesLeaf>> {
        match &self.body {
            NodeBody::Leaf(leaf) => Some(leaf),
            NodeBody::Internal(_) => None,
        }
    }

    pub(crate) fn children(&self) -> Option<&RwLock<Children>> {
        match &self.body {
            NodeBody::Internal(children) => Some(children),
            NodeBody::Leaf(_) => None,
        }
    }

    /// Children without raising their traversal counters.
    pub(crate) fn children_snapshot(&self) -> Vec<Arc<ContainerNode>> {
        match &self.body {
            NodeBody::Internal(children) => read(children).values().cloned().collect(),
            NodeBody::Leaf(_) => Vec::new(),
        }
    }

    /// Folded summary of everything below. Retired nodes are empty.
    pub fn summary(&self) -> Summary {
        if self.is_retired() {
            return Summary::empty();
        }
        match &self.body {
            NodeBody::Leaf(leaf) => read(leaf).summary(),
            NodeBody::Internal(_) => self
                .children_snapshot()
                .iter()
                .map(|child| child.summary())
                .sum(),
        }
    }

    /// Retire this node and everything below, releasing leaf buffers.
    /// Returns `(nodes, records)` dropped.
    pub(crate) fn retire_subtree(&self) -> (usize, usize) {
        self.mark_retired();
        match &self.body {
            NodeBody::Leaf(leaf) => (1, write(leaf).clear()),
            NodeBody::Internal(children) => {
                let detached = std::mem::take(&mut *write(children));
                detached
                    .values()
                    .map(|child| child.retire_subtree())
                    .fold((1, 0), |(n, r), (cn, cr)| (n + cn, r + cr))
            }
        }
    }

    /// Retire this node if it holds nothing and no traversal is inside it.
    /// Never waits on a lock. The caller holds the parent's write lock and
    /// detaches the node on success.
    pub(crate) fn retire_if_empty(&self) -> bool {
        if self.active_readers() > 0 {
            return false;
        }
        match &self.body {
            NodeBody::Leaf(leaf) => match try_write(leaf) {
                Some(leaf) if leaf.is_empty() => {
                    self.mark_retired();
                    true
                }
                _ => false,
            },
            NodeBody::Internal(children) => match try_write(children) {
                Some(map) if map.is_empty() => {
                    self.mark_retired();
                    true
                }
                _ => false,
            },
        }
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        let kind = if self.is_leaf() {
            NodeKind::Leaf
        } else if self.depth == 0 {
            NodeKind::Master
        } else {
            NodeKind::Internal
        };
        let mut children: Vec<NodeSnapshot> = if self.is_retired() {
            Vec::new()
        } else {
            self.children_snapshot()
                .iter()
                .map(|child| child.snapshot())
                .collect()
        };
        children.retain(|c| !c.retired);
        let summary = match kind {
            NodeKind::Leaf => self.summary(),
            _ => children.iter().map(|c| c.summary).sum(),
        };
        NodeSnapshot {
            segment: self.segment.clone(),
            depth: self.depth,
            kind,
            summary,
            active_readers: self.active_readers(),
            retired: self.is_retired(),
            children,
        }
    }
}

/// Keeps a node's traversal counter raised while held.
#[derive(Debug)]
pub struct ActiveGuard {
    node: Arc<ContainerNode>,
}

impl Deref for ActiveGuard {
    type Target = Arc<ContainerNode>;

    fn deref(&self) -> &Self::Target {
        &self.node
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.node.active.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Master,
    Internal,
    Leaf,
}

/// Structural copy of a subtree for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment: Option<Segment>,
    pub depth: usize,
    pub kind: NodeKind,
    pub summary: Summary,
    pub active_readers: usize,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retired: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    /// Number of nodes in the snapshot, including this one.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(NodeSnapshot::node_count).sum::<usize>()
    }
}
