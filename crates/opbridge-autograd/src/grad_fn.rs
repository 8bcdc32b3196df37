//! Gradient Function Traits - Differentiable Operation Interface
//!
//! Defines the interface for gradient functions that compute derivatives
//! during the backward pass, and `AccumulateGrad`, the terminal function that
//! owns a handle to a leaf's gradient slot.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use std::fmt::Debug;
use std::sync::Arc;

use opbridge_core::{Result, Tensor};
use parking_lot::RwLock;

// =============================================================================
// Gradient Function Trait
// =============================================================================

/// Trait for gradient computation functions.
///
/// Each differentiable operation records one of these in the graph. Given the
/// gradient of the operation's output, it returns one optional gradient per
/// input edge, in edge order.
pub trait GradientFunction: Debug + Send + Sync {
    /// Computes gradients with respect to inputs.
    fn apply(&self, grad_output: &Tensor) -> Result<Vec<Option<Tensor>>>;

    /// Returns the name of this gradient function for debugging.
    fn name(&self) -> &'static str;
}

// =============================================================================
// Accumulate Grad - Leaf Node
// =============================================================================

/// Shared gradient storage of a leaf variable.
pub type GradAccumulator = Arc<RwLock<Option<Tensor>>>;

/// Identity of a gradient slot: the address of its shared allocation.
///
/// Stable across clones of the owning variable.
pub type GradSlotId = usize;

/// Returns the identity of a gradient slot.
#[must_use]
pub fn slot_id(slot: &GradAccumulator) -> GradSlotId {
    Arc::as_ptr(slot).cast::<()>() as GradSlotId
}

/// Terminal node that writes incoming gradients into a leaf's slot.
#[derive(Clone)]
pub struct AccumulateGrad {
    slot: GradAccumulator,
}

impl AccumulateGrad {
    /// Creates an accumulator over a shared gradient slot.
    pub fn new(slot: GradAccumulator) -> Self {
        Self { slot }
    }

    /// Identity of the slot this node writes to.
    pub fn slot_id(&self) -> GradSlotId {
        slot_id(&self.slot)
    }

    /// Replaces the slot's contents with `grad`.
    pub fn store(&self, grad: Tensor) {
        *self.slot.write() = Some(grad);
    }

    /// Adds `grad` into the slot in place, storing it if the slot is empty.
    pub fn accumulate(&self, grad: &Tensor) -> Result<()> {
        let mut guard = self.slot.write();
        match guard.as_mut() {
            Some(existing) => existing.add_assign(grad),
            None => {
                *guard = Some(grad.clone());
                Ok(())
            }
        }
    }

    /// Returns the current gradient.
    pub fn grad(&self) -> Option<Tensor> {
        self.slot.read().clone()
    }
}

impl Debug for AccumulateGrad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccumulateGrad")
            .field("slot", &self.slot_id())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_grad() {
        let slot: GradAccumulator = Arc::new(RwLock::new(None));
        let acc = AccumulateGrad::new(Arc::clone(&slot));
        assert_eq!(acc.slot_id(), slot_id(&slot));

        let grad = Tensor::from_vec(vec![1.0f32, 2.0, 3.0], &[3]).unwrap();
        acc.accumulate(&grad).unwrap();
        assert_eq!(
            slot.read().as_ref().unwrap().to_vec::<f32>().unwrap(),
            vec![1.0, 2.0, 3.0]
        );

        acc.accumulate(&grad).unwrap();
        assert_eq!(acc.grad().unwrap().to_vec::<f32>().unwrap(), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_store_overwrites() {
        let acc = AccumulateGrad::new(Arc::new(RwLock::new(None)));
        acc.store(Tensor::from_vec(vec![5.0f32], &[1]).unwrap());
        acc.store(Tensor::from_vec(vec![1.0f32], &[1]).unwrap());
        assert_eq!(acc.grad().unwrap().to_vec::<f32>().unwrap(), vec![1.0]);
    }

    #[test]
    fn test_clone_keeps_identity() {
        let acc = AccumulateGrad::new(Arc::new(RwLock::new(None)));
        assert_eq!(acc.clone().slot_id(), acc.slot_id());
    }
}
