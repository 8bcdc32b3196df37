//! Shape and Strides - Tensor Dimension Management
//!
//! Shape arithmetic shared by the tensor math and the interchange adapter:
//! element counts, row-major strides, index conversion and broadcasting.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use smallvec::SmallVec;

use crate::error::{Error, Result};

// =============================================================================
// Type Aliases
// =============================================================================

/// Shape type - dimensions of a tensor.
pub type Shape = SmallVec<[usize; 6]>;

/// Strides type - element step sizes for each dimension.
pub type Strides = SmallVec<[usize; 6]>;

// =============================================================================
// Shape Utilities
// =============================================================================

/// Computes the total number of elements from a shape.
#[must_use]
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Computes row-major (C-order) strides for a shape.
#[must_use]
pub fn contiguous_strides(shape: &[usize]) -> Strides {
    let mut strides: Strides = SmallVec::from_elem(1, shape.len());
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// Computes the linear offset of a multi-dimensional index.
#[must_use]
pub fn linear_index(indices: &[usize], strides: &[usize]) -> usize {
    debug_assert_eq!(indices.len(), strides.len());
    indices.iter().zip(strides).map(|(&i, &s)| i * s).sum()
}

/// Converts a linear index to multi-dimensional indices.
#[must_use]
pub fn unravel_index(mut linear: usize, shape: &[usize]) -> Vec<usize> {
    let mut indices = vec![0; shape.len()];
    for (i, &dim) in shape.iter().enumerate().rev() {
        if dim > 0 {
            indices[i] = linear % dim;
            linear /= dim;
        }
    }
    indices
}

/// Normalizes a possibly negative dimension index.
pub fn normalize_dim(dim: i64, ndim: usize) -> Result<usize> {
    let ndim_i64 = ndim as i64;
    let normalized = if dim < 0 { dim + ndim_i64 } else { dim };
    if normalized < 0 || normalized >= ndim_i64 {
        return Err(Error::InvalidDimension { index: dim, ndim });
    }
    Ok(normalized as usize)
}

// =============================================================================
// Broadcasting
// =============================================================================

/// Computes the broadcast shape of two shapes following `NumPy` rules.
pub fn broadcast_shape(shape1: &[usize], shape2: &[usize]) -> Result<Shape> {
    let max_ndim = shape1.len().max(shape2.len());
    let mut result = Shape::with_capacity(max_ndim);

    for i in 0..max_ndim {
        let d1 = if i < shape1.len() {
            shape1[shape1.len() - 1 - i]
        } else {
            1
        };
        let d2 = if i < shape2.len() {
            shape2[shape2.len() - 1 - i]
        } else {
            1
        };

        if d1 == d2 || d2 == 1 {
            result.push(d1);
        } else if d1 == 1 {
            result.push(d2);
        } else {
            return Err(Error::BroadcastError {
                shape1: shape1.to_vec(),
                shape2: shape2.to_vec(),
            });
        }
    }

    result.reverse();
    Ok(result)
}

/// Computes strides that read a contiguous `shape` as if it had `target_shape`.
///
/// Broadcast dimensions get a zero stride. `shape` must broadcast to `target_shape`.
#[must_use]
pub fn broadcast_strides(shape: &[usize], target_shape: &[usize]) -> Strides {
    let strides = contiguous_strides(shape);
    let offset = target_shape.len() - shape.len();

    target_shape
        .iter()
        .enumerate()
        .map(|(i, &target_dim)| {
            if i < offset {
                0
            } else {
                let orig = i - offset;
                if shape[orig] == 1 && target_dim != 1 {
                    0
                } else {
                    strides[orig]
                }
            }
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
