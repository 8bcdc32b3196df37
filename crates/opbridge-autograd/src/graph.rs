//! Computational Graph - Per-Call Arena
//!
//! Each forward call records into its own `Graph`. Nodes live in a vector and
//! refer to each other by `NodeId`, so shared consumers and diamonds need no
//! reference counting. Leaves are represented by `AccumulateGrad` nodes, one
//! per gradient slot: using a leaf twice yields two edges to the same node.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use std::fmt;

use opbridge_core::Tensor;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::grad_fn::{AccumulateGrad, GradSlotId, GradientFunction};
use crate::grad_mode::is_grad_enabled;
use crate::variable::Variable;

// =============================================================================
// Node
// =============================================================================

/// Handle to a node inside one [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in its arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a node does when a gradient reaches it.
#[derive(Debug)]
pub enum NodeKind {
    /// An operation's gradient function.
    Function(Box<dyn GradientFunction>),
    /// A leaf's gradient slot.
    AccumulateGrad(AccumulateGrad),
}

/// A node and its outgoing edges, one per operation input.
#[derive(Debug)]
pub struct Node {
    kind: NodeKind,
    next_edges: Vec<Option<NodeId>>,
}

impl Node {
    /// The node's behavior.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Edges to the nodes producing each input; `None` for untracked inputs.
    pub fn next_edges(&self) -> &[Option<NodeId>] {
        &self.next_edges
    }

    /// The accumulator, if this is a leaf node.
    pub fn accumulator(&self) -> Option<&AccumulateGrad> {
        match &self.kind {
            NodeKind::AccumulateGrad(acc) => Some(acc),
            NodeKind::Function(_) => None,
        }
    }

    /// Name for diagnostics.
    pub fn name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Function(f) => f.name(),
            NodeKind::AccumulateGrad(_) => "AccumulateGrad",
        }
    }
}

// =============================================================================
// Graph
// =============================================================================

/// Arena of nodes recorded during one forward call.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    accumulators: FxHashMap<GradSlotId, NodeId>,
}

impl Graph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks up a node.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// True if an operation over `inputs` should be recorded.
    pub fn should_record(inputs: &[&Variable]) -> bool {
        is_grad_enabled() && inputs.iter().any(|v| v.requires_grad())
    }

    fn push(&mut self, kind: NodeKind, next_edges: Vec<Option<NodeId>>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { kind, next_edges });
        id
    }

    /// Returns the edge for one operation input, creating its leaf node on first use.
    fn edge_for(&mut self, input: &Variable) -> Option<NodeId> {
        if let Some(id) = input.grad_fn() {
            return Some(id);
        }
        if !input.requires_grad() {
            return None;
        }
        let slot = input.grad_slot_id();
        if let Some(&id) = self.accumulators.get(&slot) {
            return Some(id);
        }
        let id = self.push(
            NodeKind::AccumulateGrad(AccumulateGrad::new(input.grad_slot().clone())),
            Vec::new(),
        );
        self.accumulators.insert(slot, id);
        Some(id)
    }

    /// Records an operation node with one edge per input.
    pub fn record<F>(&mut self, grad_fn: F, inputs: &[&Variable]) -> NodeId
    where
        F: GradientFunction + 'static,
    {
        let next_edges: Vec<Option<NodeId>> = inputs.iter().map(|v| self.edge_for(v)).collect();
        let name = grad_fn.name();
        let id = self.push(NodeKind::Function(Box::new(grad_fn)), next_edges);
        trace!(node = %id, name, inputs = inputs.len(), "recorded graph node");
        id
    }

    /// Wraps an operation result, recording `grad_fn` when any input is tracked.
    pub fn output<F>(&mut self, data: Tensor, grad_fn: F, inputs: &[&Variable]) -> Variable
    where
        F: GradientFunction + 'static,
    {
        if Self::should_record(inputs) {
            let id = self.record(grad_fn, inputs);
            Variable::from_operation(data, id)
        } else {
            Variable::from_tensor(data)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
