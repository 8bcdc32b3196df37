//! Forward - Run an Operator and Capture Its Graph
//!
//! Runs a resolved operator on marshaled arguments. When gradient tracking is
//! requested, the flagged arguments are made to require gradients, the
//! operator records into a fresh graph, and a breadth-first walk from the
//! first output's node finds the accumulation node of every flagged input.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use std::collections::VecDeque;
use std::sync::Arc;

use opbridge_autograd::{GradModeGuard, GradSlotId, Graph, NodeId};
use opbridge_core::Tensor;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::cache::OperatorDescriptor;
use crate::context::{AutogradContext, ContextStore};
use crate::error::{BridgeError, BridgeResult};
use crate::ivalue::IValue;

// =============================================================================
// Forward Output
// =============================================================================

/// Outputs of a forward call and, when tracking, the stored context id.
#[derive(Debug)]
pub struct ForwardOutput {
    /// One tensor per schema return.
    pub outputs: Vec<Tensor>,
    /// Id of the stored context when tracking.
    pub context_id: Option<i64>,
}

// =============================================================================
// Forward Execution
// =============================================================================

/// Runs the operator.
///
/// Tracking is on iff `gradient_flags` is non-empty; `gradient_flags[i]`
/// flags argument `i`, and missing trailing flags count as false.
pub fn run_forward(
    descriptor: &OperatorDescriptor,
    mut arguments: Vec<IValue>,
    gradient_flags: &[bool],
    store: &ContextStore,
) -> BridgeResult<ForwardOutput> {
    let op = descriptor.name();
    if gradient_flags.len() > arguments.len() {
        return Err(BridgeError::FlagCountMismatch {
            op: op.clone(),
            flags: gradient_flags.len(),
            arguments: arguments.len(),
        });
    }
    let tracking = !gradient_flags.is_empty();

    // Slot identity -> position among flagged inputs. The first input wins
    // if two ever share a slot.
    let mut flagged: Vec<usize> = Vec::new();
    let mut slot_to_leaf: FxHashMap<GradSlotId, usize> = FxHashMap::default();
    for (index, _) in gradient_flags.iter().enumerate().filter(|&(_, &flag)| flag) {
        let variable = arguments[index]
            .as_tensor_mut()
            .ok_or_else(|| BridgeError::FlaggedNonTensor {
                op: op.clone(),
                index,
            })?;
        variable.set_requires_grad(true);
        slot_to_leaf
            .entry(variable.grad_slot_id())
            .or_insert(flagged.len());
        flagged.push(index);
    }

    let mut graph = Graph::new();
    let outputs = {
        let _grad_mode = tracking.then(|| GradModeGuard::new(true));
        let mut stack = arguments;
        descriptor.operator().run(&mut stack, &mut graph)?;
        collect_outputs(descriptor, stack)?
    };

    if !tracking {
        return Ok(ForwardOutput {
            outputs: outputs.into_iter().map(|(tensor, _)| tensor).collect(),
            context_id: None,
        });
    }

    let root = outputs
        .first()
        .and_then(|(_, node)| *node)
        .ok_or_else(|| BridgeError::MissingRoot { op: op.clone() })?;
    let leaves = find_leaves(&graph, root, &slot_to_leaf, flagged.len())?;
    let leaves = leaves
        .into_iter()
        .zip(&flagged)
        .map(|(leaf, &index)| {
            leaf.ok_or_else(|| BridgeError::UnreachableInput {
                op: op.clone(),
                index,
            })
        })
        .collect::<BridgeResult<Vec<_>>>()?;

    let context_id = store.insert(AutogradContext::new(Arc::new(graph), root, leaves));
    Ok(ForwardOutput {
        outputs: outputs.into_iter().map(|(tensor, _)| tensor).collect(),
        context_id: Some(context_id),
    })
}

/// Takes exactly `output_count` tensors off the stack with their producing nodes.
fn collect_outputs(
    descriptor: &OperatorDescriptor,
    mut stack: Vec<IValue>,
) -> BridgeResult<Vec<(Tensor, Option<NodeId>)>> {
    let expected = descriptor.output_count();
    if stack.len() != expected {
        return Err(BridgeError::OutputCountMismatch {
            op: descriptor.name().clone(),
            expected,
            actual: stack.len(),
        });
    }
    stack
        .drain(..)
        .enumerate()
        .map(|(index, value)| {
            let actual = value.type_name();
            value
                .into_tensor()
                .map(|v| {
                    let node = v.grad_fn();
                    (v.into_data(), node)
                })
                .ok_or_else(|| BridgeError::NonTensorOutput {
                    op: descriptor.name().clone(),
                    index,
                    actual,
                })
        })
        .collect()
}

/// Breadth-first search from `root` for the accumulation node of each flagged slot.
///
/// There is no visited set: accumulation nodes are matched by slot identity
/// and never enqueued, and re-walking a shared internal node only repeats
/// lookups. The first match for a position is kept.
fn find_leaves(
    graph: &Graph,
    root: NodeId,
    slot_to_leaf: &FxHashMap<GradSlotId, usize>,
    count: usize,
) -> BridgeResult<Vec<Option<NodeId>>> {
    let mut leaves = vec![None; count];
    let mut queue = VecDeque::from([root]);

    while let Some(id) = queue.pop_front() {
        let node = graph
            .node(id)
            .ok_or_else(|| BridgeError::DanglingEdge(id.to_string()))?;
        trace!(node = %id, name = node.name(), edges = node.next_edges().len(), "forward walk");

        for &target_id in node.next_edges().iter().flatten() {
            let target = graph
                .node(target_id)
                .ok_or_else(|| BridgeError::DanglingEdge(target_id.to_string()))?;
            match target.accumulator() {
                Some(acc) => {
                    if let Some(&position) = slot_to_leaf.get(&acc.slot_id()) {
                        leaves[position].get_or_insert(target_id);
                    }
                }
                None => queue.push_back(target_id),
            }
        }
    }
    Ok(leaves)
}

// =============================================================================
// Tests
// =============================================================================
