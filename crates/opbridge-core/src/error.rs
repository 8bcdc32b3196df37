//! Error Types - OpBridge Core Error Handling
//!
//! Error types for tensor construction, tensor math and DLPack interchange.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use thiserror::Error;

use crate::dtype::DType;

// =============================================================================
// Error Types
// =============================================================================

/// The main error type for core tensor operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Shape mismatch between tensors or between data and shape.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// The expected shape.
        expected: Vec<usize>,
        /// The actual shape.
        actual: Vec<usize>,
    },

    /// Data type mismatch between tensors.
    #[error("DType mismatch: expected {expected}, got {actual}")]
    DTypeMismatch {
        /// The expected data type.
        expected: DType,
        /// The actual data type.
        actual: DType,
    },

    /// The operation is not defined for this data type.
    #[error("Operation '{op}' is not supported for dtype {dtype}")]
    UnsupportedDType {
        /// Name of the operation.
        op: &'static str,
        /// The offending data type.
        dtype: DType,
    },

    /// Invalid dimension index.
    #[error("Invalid dimension: index {index} for tensor with {ndim} dimensions")]
    InvalidDimension {
        /// The invalid dimension index.
        index: i64,
        /// Number of dimensions in the tensor.
        ndim: usize,
    },

    /// Index out of bounds.
    #[error("Index out of bounds: index {index} for size {size}")]
    IndexOutOfBounds {
        /// The invalid index.
        index: usize,
        /// The size of the indexed extent.
        size: usize,
    },

    /// Broadcasting failed between shapes.
    #[error("Cannot broadcast shapes {shape1:?} and {shape2:?}")]
    BroadcastError {
        /// The first shape.
        shape1: Vec<usize>,
        /// The second shape.
        shape2: Vec<usize>,
    },

    /// Operation not supported on empty tensor.
    #[error("Operation not supported on empty tensor")]
    EmptyTensor,

    /// A DLPack descriptor could not be imported.
    #[error("Invalid DLPack tensor: {message}")]
    Interchange {
        /// Description of the problem.
        message: String,
    },
}

// =============================================================================
// Result Type
// =============================================================================

/// A specialized Result type for core operations.
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// Helper Functions
// =============================================================================

impl Error {
    /// Creates a new shape mismatch error.
    #[must_use]
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Creates a new interchange error.
    #[must_use]
    pub fn interchange(message: impl Into<String>) -> Self {
        Self::Interchange {
            message: message.into(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::shape_mismatch(&[2, 3], &[2, 4]);
        assert!(err.to_string().contains("Shape mismatch"));

        let err = Error::UnsupportedDType {
            op: "add",
            dtype: DType::I64,
        };
        assert_eq!(
            err.to_string(),
            "Operation 'add' is not supported for dtype i64"
        );
    }

    #[test]
    fn test_interchange_error() {
        let err = Error::interchange("device is not CPU");
        assert_eq!(err.to_string(), "Invalid DLPack tensor: device is not CPU");
    }
}
