//! Basic Gradient Functions - Arithmetic Operations
//!
//! Gradient functions for add, sub, mul and neg. Inputs may have been
//! broadcast, so each gradient is summed back to its input's shape.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use opbridge_core::{Result, Tensor};

use crate::grad_fn::GradientFunction;

// =============================================================================
// Add Backward
// =============================================================================

/// Gradient function for `lhs + alpha * rhs`.
///
/// d/dlhs = 1, d/drhs = alpha
#[derive(Debug)]
pub struct AddBackward {
    alpha: f64,
    input_shapes: (Vec<usize>, Vec<usize>),
}

impl AddBackward {
    /// Creates a new `AddBackward`.
    #[must_use]
    pub fn new(alpha: f64, lhs_shape: Vec<usize>, rhs_shape: Vec<usize>) -> Self {
        Self {
            alpha,
            input_shapes: (lhs_shape, rhs_shape),
        }
    }
}

impl GradientFunction for AddBackward {
    fn apply(&self, grad_output: &Tensor) -> Result<Vec<Option<Tensor>>> {
        let grad_lhs = grad_output.sum_to_shape(&self.input_shapes.0)?;
        let grad_rhs = scaled(grad_output, self.alpha)?.sum_to_shape(&self.input_shapes.1)?;
        Ok(vec![Some(grad_lhs), Some(grad_rhs)])
    }

    fn name(&self) -> &'static str {
        "AddBackward"
    }
}

// =============================================================================
// Sub Backward
// =============================================================================

/// Gradient function for `lhs - alpha * rhs`.
///
/// d/dlhs = 1, d/drhs = -alpha
#[derive(Debug)]
pub struct SubBackward {
    alpha: f64,
    input_shapes: (Vec<usize>, Vec<usize>),
}

impl SubBackward {
    /// Creates a new `SubBackward`.
    #[must_use]
    pub fn new(alpha: f64, lhs_shape: Vec<usize>, rhs_shape: Vec<usize>) -> Self {
        Self {
            alpha,
            input_shapes: (lhs_shape, rhs_shape),
        }
    }
}

impl GradientFunction for SubBackward {
    fn apply(&self, grad_output: &Tensor) -> Result<Vec<Option<Tensor>>> {
        let grad_lhs = grad_output.sum_to_shape(&self.input_shapes.0)?;
        let grad_rhs = grad_output
            .scale(-self.alpha)?
            .sum_to_shape(&self.input_shapes.1)?;
        Ok(vec![Some(grad_lhs), Some(grad_rhs)])
    }

    fn name(&self) -> &'static str {
        "SubBackward"
    }
}

// =============================================================================
// Mul Backward
// =============================================================================

/// Gradient function for multiplication.
///
/// d/dx(x * y) = y, d/dy(x * y) = x
#[derive(Debug)]
pub struct MulBackward {
    saved_lhs: Tensor,
    saved_rhs: Tensor,
}

impl MulBackward {
    /// Creates a new `MulBackward`.
    #[must_use]
    pub fn new(lhs: Tensor, rhs: Tensor) -> Self {
        Self {
            saved_lhs: lhs,
            saved_rhs: rhs,
        }
    }
}

impl GradientFunction for MulBackward {
    fn apply(&self, grad_output: &Tensor) -> Result<Vec<Option<Tensor>>> {
        let grad_lhs = grad_output
            .mul(&self.saved_rhs)?
            .sum_to_shape(self.saved_lhs.shape())?;
        let grad_rhs = grad_output
            .mul(&self.saved_lhs)?
            .sum_to_shape(self.saved_rhs.shape())?;
        Ok(vec![Some(grad_lhs), Some(grad_rhs)])
    }

    fn name(&self) -> &'static str {
        "MulBackward"
    }
}

// =============================================================================
// Neg Backward
// =============================================================================

/// Gradient function for negation.
#[derive(Debug)]
pub struct NegBackward;

impl GradientFunction for NegBackward {
    fn apply(&self, grad_output: &Tensor) -> Result<Vec<Option<Tensor>>> {
        Ok(vec![Some(grad_output.neg()?)])
    }

    fn name(&self) -> &'static str {
        "NegBackward"
    }
}

/// Avoids a pass over the data when `alpha` is exactly 1.
fn scaled(grad: &Tensor, alpha: f64) -> Result<Tensor> {
    if (alpha - 1.0).abs() < f64::EPSILON {
        Ok(grad.clone())
    } else {
        grad.scale(alpha)
    }
}

// =============================================================================
// Tests
// =============================================================================
