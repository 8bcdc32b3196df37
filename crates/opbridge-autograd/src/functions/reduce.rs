//! Reduction and Layout Gradient Functions
//!
//! Gradient functions for full and per-dimension sums, transposition and
//! min/max selection.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use opbridge_core::{Error, Extremum, Result, Tensor};

use crate::grad_fn::GradientFunction;

// =============================================================================
// Sum Backward
// =============================================================================

/// Gradient function for a full sum: broadcasts the scalar gradient back.
#[derive(Debug)]
pub struct SumBackward {
    input_shape: Vec<usize>,
}

impl SumBackward {
    /// Creates a new `SumBackward`.
    #[must_use]
    pub fn new(input_shape: Vec<usize>) -> Self {
        Self { input_shape }
    }
}

impl GradientFunction for SumBackward {
    fn apply(&self, grad_output: &Tensor) -> Result<Vec<Option<Tensor>>> {
        Ok(vec![Some(grad_output.expand(&self.input_shape)?)])
    }

    fn name(&self) -> &'static str {
        "SumBackward"
    }
}

// =============================================================================
// Sum Dim Backward
// =============================================================================

/// Gradient function for a sum over selected dimensions.
#[derive(Debug)]
pub struct SumDimBackward {
    input_shape: Vec<usize>,
    dims: Vec<usize>,
}

impl SumDimBackward {
    /// Creates a new `SumDimBackward`. An empty `dims` means every dimension.
    #[must_use]
    pub fn new(input_shape: Vec<usize>, dims: Vec<usize>) -> Self {
        Self { input_shape, dims }
    }
}

impl GradientFunction for SumDimBackward {
    fn apply(&self, grad_output: &Tensor) -> Result<Vec<Option<Tensor>>> {
        // Restore reduced dimensions as size 1 whether or not they were kept.
        let kept: Vec<usize> = self
            .input_shape
            .iter()
            .enumerate()
            .map(|(d, &size)| {
                if self.dims.is_empty() || self.dims.contains(&d) {
                    1
                } else {
                    size
                }
            })
            .collect();
        let grad = grad_output.reshape(&kept)?.expand(&self.input_shape)?;
        Ok(vec![Some(grad)])
    }

    fn name(&self) -> &'static str {
        "SumDimBackward"
    }
}

// =============================================================================
// Transpose Backward
// =============================================================================

/// Gradient function for swapping two dimensions.
#[derive(Debug)]
pub struct TransposeBackward {
    dim0: usize,
    dim1: usize,
}

impl TransposeBackward {
    /// Creates a new `TransposeBackward`.
    #[must_use]
    pub fn new(dim0: usize, dim1: usize) -> Self {
        Self { dim0, dim1 }
    }
}

impl GradientFunction for TransposeBackward {
    fn apply(&self, grad_output: &Tensor) -> Result<Vec<Option<Tensor>>> {
        Ok(vec![Some(grad_output.transpose(self.dim0, self.dim1)?)])
    }

    fn name(&self) -> &'static str {
        "TransposeBackward"
    }
}

// =============================================================================
// Extremum Backward
// =============================================================================

/// Gradient function for a min or max reduction.
///
/// The whole gradient goes to the first element that attained the extremum.
#[derive(Debug)]
pub struct ExtremumBackward {
    kind: Extremum,
    saved_input: Tensor,
    index: usize,
}

impl ExtremumBackward {
    /// Creates a new `ExtremumBackward` routing to flat `index` of `input`.
    #[must_use]
    pub fn new(kind: Extremum, input: Tensor, index: usize) -> Self {
        Self {
            kind,
            saved_input: input,
            index,
        }
    }
}

impl GradientFunction for ExtremumBackward {
    fn apply(&self, grad_output: &Tensor) -> Result<Vec<Option<Tensor>>> {
        let value = grad_output
            .storage()
            .to_f64_values()
            .first()
            .copied()
            .ok_or(Error::EmptyTensor)?;
        Ok(vec![Some(self.saved_input.one_hot_like(self.index, value)?)])
    }

    fn name(&self) -> &'static str {
        match self.kind {
            Extremum::Min => "MinBackward",
            Extremum::Max => "MaxBackward",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
