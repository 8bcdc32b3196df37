//! Backward - Replay a Captured Graph
//!
//! Breadth-first gradient propagation from a context's root. Internal nodes
//! run once per gradient that reaches them. Accumulation nodes are never
//! enqueued: the first gradient reaching one in a traversal replaces its
//! contents, later ones are added in place.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use std::collections::VecDeque;

use opbridge_autograd::{Graph, Node, NodeId, NodeKind};
use opbridge_core::Tensor;
use rustc_hash::FxHashSet;
use tracing::trace;

use crate::context::AutogradContext;
use crate::error::{BridgeError, BridgeResult};

// =============================================================================
// Backward Execution
// =============================================================================

/// Propagates `grad_output` from the root and returns one gradient per leaf,
/// in flagged-input order.
pub fn run_backward(context: &AutogradContext, grad_output: Tensor) -> BridgeResult<Vec<Tensor>> {
    let graph = context.graph();
    let mut queue: VecDeque<(NodeId, Tensor)> = VecDeque::from([(context.root(), grad_output)]);
    let mut reached: FxHashSet<NodeId> = FxHashSet::default();

    while let Some((id, grad)) = queue.pop_front() {
        let node = lookup(graph, id)?;
        let grads = match node.kind() {
            NodeKind::Function(f) => f.apply(&grad)?,
            NodeKind::AccumulateGrad(acc) => {
                acc.accumulate(&grad)?;
                continue;
            }
        };

        let edges = node.next_edges();
        if grads.len() != edges.len() {
            return Err(BridgeError::GradientCountMismatch {
                node: node.name(),
                expected: edges.len(),
                actual: grads.len(),
            });
        }
        trace!(node = %id, name = node.name(), edges = edges.len(), "backward step");

        for (edge, grad) in edges.iter().zip(grads) {
            let (Some(target_id), Some(grad)) = (*edge, grad) else {
                continue;
            };
            match lookup(graph, target_id)?.accumulator() {
                Some(acc) if reached.insert(target_id) => acc.store(grad),
                Some(acc) => acc.accumulate(&grad)?,
                None => queue.push_back((target_id, grad)),
            }
        }
    }

    context
        .leaves()
        .iter()
        .enumerate()
        .map(|(index, &leaf)| {
            lookup(graph, leaf)?
                .accumulator()
                .and_then(|acc| acc.grad())
                .ok_or(BridgeError::MissingGradient { index })
        })
        .collect()
}

fn lookup(graph: &Graph, id: NodeId) -> BridgeResult<&Node> {
    graph
        .node(id)
        .ok_or_else(|| BridgeError::DanglingEdge(id.to_string()))
}

// =============================================================================
// Tests
// =============================================================================
