//! Variable - Tensor with Gradient Tracking
//!
//! A `Variable` pairs a tensor with a shared gradient slot. Leaves that
//! require gradients get an `AccumulateGrad` node the first time an operation
//! in a graph consumes them; operation results remember the node that
//! produced them.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use std::sync::Arc;

use opbridge_core::Tensor;
use parking_lot::RwLock;

use crate::grad_fn::{slot_id, GradAccumulator, GradSlotId};
use crate::graph::NodeId;

// =============================================================================
// Variable Struct
// =============================================================================

/// A tensor with automatic differentiation support.
#[derive(Debug, Clone)]
pub struct Variable {
    /// The underlying tensor data.
    data: Tensor,
    /// Gradient slot, shared with any `AccumulateGrad` node for this leaf.
    grad: GradAccumulator,
    /// Whether operations on this variable are recorded.
    requires_grad: bool,
    /// Node that produced this variable, `None` for leaves.
    grad_fn: Option<NodeId>,
}

impl Variable {
    /// Creates a leaf variable.
    #[must_use]
    pub fn new(data: Tensor, requires_grad: bool) -> Self {
        Self {
            data,
            grad: Arc::new(RwLock::new(None)),
            requires_grad,
            grad_fn: None,
        }
    }

    /// Creates a leaf that does not require gradients.
    #[must_use]
    pub fn from_tensor(data: Tensor) -> Self {
        Self::new(data, false)
    }

    /// Creates the result of a recorded operation.
    #[must_use]
    pub fn from_operation(data: Tensor, grad_fn: NodeId) -> Self {
        Self {
            data,
            grad: Arc::new(RwLock::new(None)),
            requires_grad: true,
            grad_fn: Some(grad_fn),
        }
    }

    /// Returns the underlying tensor.
    pub fn data(&self) -> &Tensor {
        &self.data
    }

    /// Consumes the variable, returning its tensor.
    pub fn into_data(self) -> Tensor {
        self.data
    }

    /// Returns the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Returns whether operations on this variable are recorded.
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Sets gradient tracking on a leaf. Results of operations always track.
    pub fn set_requires_grad(&mut self, requires_grad: bool) {
        if self.is_leaf() {
            self.requires_grad = requires_grad;
        }
    }

    /// Returns true if no recorded operation produced this variable.
    pub fn is_leaf(&self) -> bool {
        self.grad_fn.is_none()
    }

    /// The node that produced this variable.
    pub fn grad_fn(&self) -> Option<NodeId> {
        self.grad_fn
    }

    /// Returns the accumulated gradient.
    pub fn grad(&self) -> Option<Tensor> {
        self.grad.read().clone()
    }

    /// The shared gradient slot.
    pub fn grad_slot(&self) -> &GradAccumulator {
        &self.grad
    }

    /// Identity of the gradient slot, stable across clones.
    pub fn grad_slot_id(&self) -> GradSlotId {
        slot_id(&self.grad)
    }
}

// =============================================================================
// Tests
// =============================================================================
