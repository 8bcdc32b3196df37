//! Context - Pending Autograd Contexts
//!
//! A forward call that tracks gradients leaves an `AutogradContext` behind,
//! keyed by an integer id that the caller later hands to the backward call.
//! Ids come from a monotonically increasing counter and are never reused by
//! the same store. Popping removes the context, so each id is good for one
//! backward call.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use opbridge_autograd::{Graph, NodeId};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::error::{BridgeError, BridgeResult};

// =============================================================================
// Autograd Context
// =============================================================================

/// A recorded graph, its root, and the leaf reached for each flagged input.
#[derive(Debug, Clone)]
pub struct AutogradContext {
    graph: Arc<Graph>,
    root: NodeId,
    leaves: Vec<NodeId>,
}

impl AutogradContext {
    /// Creates a context. `leaves` are in flagged-input order.
    pub fn new(graph: Arc<Graph>, root: NodeId, leaves: Vec<NodeId>) -> Self {
        Self {
            graph,
            root,
            leaves,
        }
    }

    /// The recorded graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Node that produced the first output.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Accumulation node of each flagged input.
    pub fn leaves(&self) -> &[NodeId] {
        &self.leaves
    }
}

// =============================================================================
// Context Store
// =============================================================================

/// Keyed table of pending contexts.
#[derive(Debug)]
pub struct ContextStore {
    contexts: Mutex<FxHashMap<i64, AutogradContext>>,
    next_id: AtomicI64,
    warn_threshold: usize,
}

impl ContextStore {
    /// Creates an empty store that warns above `warn_threshold` pending contexts.
    pub fn new(warn_threshold: usize) -> Self {
        Self {
            contexts: Mutex::new(FxHashMap::default()),
            next_id: AtomicI64::new(0),
            warn_threshold,
        }
    }

    /// Stores a context and returns its id.
    pub fn insert(&self, context: AutogradContext) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let pending = {
            let mut contexts = self.contexts.lock();
            contexts.insert(id, context);
            contexts.len()
        };
        debug!(context_id = id, pending, "stored autograd context");
        if pending > self.warn_threshold {
            warn!(
                pending,
                threshold = self.warn_threshold,
                "autograd contexts are piling up; backward calls may be missing"
            );
        }
        id
    }

    /// Removes and returns a context.
    pub fn pop(&self, id: i64) -> BridgeResult<AutogradContext> {
        let context = self
            .contexts
            .lock()
            .remove(&id)
            .ok_or(BridgeError::UnknownContext(id))?;
        debug!(context_id = id, "popped autograd context");
        Ok(context)
    }

    /// Number of pending contexts.
    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.contexts.lock().is_empty()
    }

    /// Drops every pending context.
    pub fn clear(&self) {
        self.contexts.lock().clear();
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new(1024)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use opbridge_autograd::{ops, Variable};
    use opbridge_core::Tensor;

    fn context() -> AutogradContext {
        let mut graph = Graph::new();
        let a = Variable::new(Tensor::from_vec(vec![1.0f32], &[1]).unwrap(), true);
        let y = ops::neg(&mut graph, &a).unwrap();
        let root = y.grad_fn().unwrap();
        let leaf = graph.node(root).unwrap().next_edges()[0].unwrap();
        AutogradContext::new(Arc::new(graph), root, vec![leaf])
    }

    #[test]
    fn test_ids_increase() {
        let store = ContextStore::default();
        let first = store.insert(context());
        let second = store.insert(context());
        assert!(second > first);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_pop_is_single_use() {
        let store = ContextStore::default();
        let id = store.insert(context());
        let ctx = store.pop(id).unwrap();
        assert_eq!(ctx.leaves().len(), 1);
        assert!(matches!(store.pop(id), Err(BridgeError::UnknownContext(i)) if i == id));
        assert!(store.is_empty());
    }

    #[test]
    fn test_ids_not_reused_after_pop() {
        let store = ContextStore::default();
        let id = store.insert(context());
        store.pop(id).unwrap();
        assert_ne!(store.insert(context()), id);
    }

    #[test]
    fn test_clear() {
        let store = ContextStore::new(1);
        store.insert(context());
        store.insert(context());
        store.clear();
        assert!(store.is_empty());
    }
}
