//! Storage - Type-Erased Element Buffers
//!
//! `Storage` owns a contiguous buffer of one element type. Tensors share it
//! through an `Arc` and clone it on write.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use std::ffi::c_void;

use crate::dtype::{DType, Element};
use crate::error::{Error, Result};

// =============================================================================
// Storage Enum
// =============================================================================

/// A contiguous, typed element buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    /// 32-bit floats.
    F32(Vec<f32>),
    /// 64-bit floats.
    F64(Vec<f64>),
    /// 32-bit signed integers.
    I32(Vec<i32>),
    /// 64-bit signed integers.
    I64(Vec<i64>),
    /// 8-bit unsigned integers.
    U8(Vec<u8>),
    /// Booleans, one byte each.
    Bool(Vec<bool>),
}

/// Applies `$body` to the vector inside any storage variant.
macro_rules! for_each_variant {
    ($storage:expr, $data:ident => $body:expr) => {
        match $storage {
            Storage::F32($data) => $body,
            Storage::F64($data) => $body,
            Storage::I32($data) => $body,
            Storage::I64($data) => $body,
            Storage::U8($data) => $body,
            Storage::Bool($data) => $body,
        }
    };
}

/// Rebuilds storage of the same variant from `$body`, which must yield a `Vec`.
macro_rules! map_variant {
    ($storage:expr, $data:ident => $body:expr) => {
        match $storage {
            Storage::F32($data) => Storage::F32($body),
            Storage::F64($data) => Storage::F64($body),
            Storage::I32($data) => Storage::I32($body),
            Storage::I64($data) => Storage::I64($body),
            Storage::U8($data) => Storage::U8($body),
            Storage::Bool($data) => Storage::Bool($body),
        }
    };
}

impl Storage {
    /// Creates zero-initialized storage of `len` elements.
    #[must_use]
    pub fn zeros(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::F32 => Self::F32(vec![0.0; len]),
            DType::F64 => Self::F64(vec![0.0; len]),
            DType::I32 => Self::I32(vec![0; len]),
            DType::I64 => Self::I64(vec![0; len]),
            DType::U8 => Self::U8(vec![0; len]),
            DType::Bool => Self::Bool(vec![false; len]),
        }
    }

    /// Builds float storage from widened values.
    pub fn from_f64_values(dtype: DType, values: Vec<f64>) -> Result<Self> {
        match dtype {
            DType::F32 => Ok(Self::F32(values.into_iter().map(|v| v as f32).collect())),
            DType::F64 => Ok(Self::F64(values)),
            other => Err(Error::UnsupportedDType {
                op: "from_f64_values",
                dtype: other,
            }),
        }
    }

    /// Returns the element type.
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::F32(_) => DType::F32,
            Self::F64(_) => DType::F64,
            Self::I32(_) => DType::I32,
            Self::I64(_) => DType::I64,
            Self::U8(_) => DType::U8,
            Self::Bool(_) => DType::Bool,
        }
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        for_each_variant!(self, data => data.len())
    }

    /// Returns true if the storage holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widens every element to `f64`.
    #[must_use]
    pub fn to_f64_values(&self) -> Vec<f64> {
        for_each_variant!(self, data => data.iter().map(|v| Element::to_f64(*v)).collect())
    }

    /// Returns a new storage holding `self[indices[i]]` at position `i`.
    pub fn gather(&self, indices: &[usize]) -> Result<Self> {
        let len = self.len();
        if let Some(&bad) = indices.iter().find(|&&i| i >= len) {
            return Err(Error::IndexOutOfBounds {
                index: bad,
                size: len,
            });
        }
        Ok(map_variant!(self, data => indices.iter().map(|&i| data[i]).collect()))
    }

    /// Raw pointer to the first element, for interchange export.
    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        for_each_variant!(self, data => data.as_mut_ptr().cast::<c_void>())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_zeros() {
        let storage = Storage::zeros(DType::I64, 4);
        assert_eq!(storage.dtype(), DType::I64);
        assert_eq!(storage.len(), 4);
        assert_eq!(storage, Storage::I64(vec![0; 4]));
    }

    #[test]
    fn test_storage_gather() {
        let storage = Storage::F32(vec![1.0, 2.0, 3.0]);
        let gathered = storage.gather(&[2, 0, 0]).unwrap();
        assert_eq!(gathered, Storage::F32(vec![3.0, 1.0, 1.0]));

        assert!(matches!(
            storage.gather(&[3]),
            Err(Error::IndexOutOfBounds { index: 3, size: 3 })
        ));
    }

    #[test]
    fn test_from_f64_values_rejects_integers() {
        assert!(Storage::from_f64_values(DType::F64, vec![1.0]).is_ok());
        assert!(Storage::from_f64_values(DType::I64, vec![1.0]).is_err());
    }

    #[test]
    fn test_to_f64_values() {
        let storage = Storage::Bool(vec![true, false]);
        assert_eq!(storage.to_f64_values(), vec![1.0, 0.0]);
    }
}
