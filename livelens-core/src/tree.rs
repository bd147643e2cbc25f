//! Render trees and the targets that point into them
//!
//! A [`RenderTree`] owns an ordered list of nodes plus the refresh callback it
//! was built with. Attaching a value returns a [`RenderTarget`], a weak handle
//! that can replace that one node later. Every replacement re-runs the tree's
//! refresh callback synchronously on the calling thread.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::value::Value;

/// Identifier of a node, unique within its tree and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type RefreshFn = dyn Fn(&RenderTree) + Send + Sync;

struct TreeInner {
    // Ids are pushed in ascending order, so this stays sorted by id
    nodes: RwLock<Vec<(NodeId, Value)>>,
    next_id: AtomicU64,
    refresh: Box<RefreshFn>,
}

/// Addressable, mutable tree of values
#[derive(Clone)]
pub struct RenderTree {
    inner: Arc<TreeInner>,
}

impl RenderTree {
    /// Create an empty tree with its refresh callback
    pub fn new<F>(refresh: F) -> Self
    where
        F: Fn(&RenderTree) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(TreeInner {
                nodes: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(0),
                refresh: Box::new(refresh),
            }),
        }
    }

    /// Insert a value as a new node and refresh the tree
    pub fn attach(&self, value: impl Into<Value>) -> RenderTarget {
        let id = NodeId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        {
            let mut nodes = self.inner.nodes.write();
            // Concurrent attaches can take ids out of order; keep the vector sorted
            let at = nodes.partition_point(|(existing, _)| *existing < id);
            nodes.insert(at, (id, value.into()));
        }

        let target = RenderTarget {
            tree: Arc::downgrade(&self.inner),
            id,
        };
        self.refresh();
        target
    }

    /// Run the refresh callback against the current content
    pub fn refresh(&self) {
        (self.inner.refresh)(self);
    }

    /// Copy of every node in id order
    pub fn snapshot(&self) -> Vec<(NodeId, Value)> {
        self.inner.nodes.read().clone()
    }

    pub fn get(&self, id: NodeId) -> Option<Value> {
        let nodes = self.inner.nodes.read();
        nodes
            .binary_search_by_key(&id, |(node_id, _)| *node_id)
            .ok()
            .map(|index| nodes[index].1.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.nodes.read().is_empty()
    }

    /// Whether both handles refer to the same tree
    pub fn ptr_eq(&self, other: &RenderTree) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn modify<F>(&self, id: NodeId, f: F) -> bool
    where
        F: FnOnce(&Value) -> Value,
    {
        let mut nodes = self.inner.nodes.write();
        match nodes.binary_search_by_key(&id, |(node_id, _)| *node_id) {
            Ok(index) => {
                let next = f(&nodes[index].1);
                nodes[index].1 = next;
                true
            }
            Err(_) => false,
        }
    }

    fn replace(&self, id: NodeId, value: Value) -> bool {
        let mut nodes = self.inner.nodes.write();
        match nodes.binary_search_by_key(&id, |(node_id, _)| *node_id) {
            Ok(index) => {
                nodes[index].1 = value;
                true
            }
            Err(_) => false,
        }
    }
}

impl PartialEq for RenderTree {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for RenderTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderTree")
            .field("nodes", &self.len())
            .field("next_id", &self.inner.next_id.load(Ordering::Relaxed))
            .finish()
    }
}

/// Handle to a single node of a render tree
///
/// Holds the tree weakly: once the tree is gone, `set` does nothing.
#[derive(Clone)]
pub struct RenderTarget {
    tree: Weak<TreeInner>,
    id: NodeId,
}

impl RenderTarget {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The owning tree, if it is still alive
    pub fn tree(&self) -> Option<RenderTree> {
        self.tree.upgrade().map(|inner| RenderTree { inner })
    }

    pub fn get(&self) -> Option<Value> {
        self.tree().and_then(|tree| tree.get(self.id))
    }

    /// Replace the node's value and refresh the owning tree
    pub fn set(&self, value: impl Into<Value>) {
        let Some(tree) = self.tree() else {
            debug!("Ignoring update of {}: render tree has been dropped", self.id);
            return;
        };

        if tree.replace(self.id, value.into()) {
            tree.refresh();
        }
    }

    /// Compute the next value from the current one, then refresh
    ///
    /// `f` runs under the tree's write lock, so concurrent updates of the
    /// same node are never lost. It must not touch the tree itself.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&Value) -> Value,
    {
        let Some(tree) = self.tree() else {
            debug!("Ignoring update of {}: render tree has been dropped", self.id);
            return;
        };

        if tree.modify(self.id, f) {
            tree.refresh();
        }
    }
}

impl fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderTarget")
            .field("id", &self.id)
            .field("alive", &(self.tree.strong_count() > 0))
            .finish()
    }
}
