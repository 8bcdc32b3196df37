//! Activation Gradient Functions
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use opbridge_core::{Result, Tensor};

use crate::grad_fn::GradientFunction;

// =============================================================================
// ReLU Backward
// =============================================================================

/// Gradient function for ReLU.
///
/// d/dx relu(x) = 1 if x > 0, else 0
#[derive(Debug)]
pub struct ReluBackward {
    saved_input: Tensor,
}

impl ReluBackward {
    /// Creates a new `ReluBackward`.
    #[must_use]
    pub fn new(input: Tensor) -> Self {
        Self { saved_input: input }
    }
}

impl GradientFunction for ReluBackward {
    fn apply(&self, grad_output: &Tensor) -> Result<Vec<Option<Tensor>>> {
        Ok(vec![Some(grad_output.gated_by(&self.saved_input, 0.0)?)])
    }

    fn name(&self) -> &'static str {
        "ReluBackward"
    }
}

// =============================================================================
// Leaky ReLU Backward
// =============================================================================

/// Gradient function for leaky ReLU.
///
/// d/dx leaky_relu(x) = 1 if x > 0, else negative_slope
#[derive(Debug)]
pub struct LeakyReluBackward {
    saved_input: Tensor,
    negative_slope: f64,
}

impl LeakyReluBackward {
    /// Creates a new `LeakyReluBackward`.
    #[must_use]
    pub fn new(input: Tensor, negative_slope: f64) -> Self {
        Self {
            saved_input: input,
            negative_slope,
        }
    }
}

impl GradientFunction for LeakyReluBackward {
    fn apply(&self, grad_output: &Tensor) -> Result<Vec<Option<Tensor>>> {
        Ok(vec![Some(
            grad_output.gated_by(&self.saved_input, self.negative_slope)?,
        )])
    }

    fn name(&self) -> &'static str {
        "LeakyReluBackward"
    }
}

// =============================================================================
// Tests
// =============================================================================
