//! Data Types - OpBridge Type System
//!
//! Defines the element types a bridged tensor can hold and the `Element`
//! trait that connects Rust scalar types to their runtime `DType`.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use core::fmt::Debug;

use crate::storage::Storage;

// =============================================================================
// DType Enum
// =============================================================================

/// Runtime representation of tensor data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DType {
    /// 32-bit floating point.
    #[default]
    F32,
    /// 64-bit floating point.
    F64,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 8-bit unsigned integer.
    U8,
    /// Boolean, stored as one byte per element.
    Bool,
}

impl DType {
    /// Returns the size in bytes of one element.
    #[must_use]
    pub const fn size_of(self) -> usize {
        match self {
            Self::U8 | Self::Bool => 1,
            Self::F32 | Self::I32 => 4,
            Self::F64 | Self::I64 => 8,
        }
    }

    /// Returns true if this is a floating point type.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Returns the name of this data type.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::Bool => "bool",
        }
    }
}

impl core::fmt::Display for DType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Element Trait
// =============================================================================

/// Trait for Rust scalar types that can be stored in a [`Tensor`](crate::Tensor).
pub trait Element: Copy + Debug + Default + PartialEq + Send + Sync + 'static {
    /// The runtime dtype for this scalar type.
    const DTYPE: DType;

    /// Wraps a vector of this type in type-erased storage.
    fn into_storage(data: Vec<Self>) -> Storage;

    /// Borrows the elements of `storage` if it holds this type.
    fn slice(storage: &Storage) -> Option<&[Self]>;

    /// Widens to `f64` for the float math paths.
    fn to_f64(self) -> f64;

    /// Narrows from `f64`.
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const DTYPE: DType = DType::$variant;

            fn into_storage(data: Vec<Self>) -> Storage {
                Storage::$variant(data)
            }

            fn slice(storage: &Storage) -> Option<&[Self]> {
                match storage {
                    Storage::$variant(data) => Some(data),
                    _ => None,
                }
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(value: f64) -> Self {
                value as $ty
            }
        }
    };
}

impl_element!(f32, F32);
impl_element!(f64, F64);
impl_element!(i32, I32);
impl_element!(i64, I64);
impl_element!(u8, U8);

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    fn into_storage(data: Vec<Self>) -> Storage {
        Storage::Bool(data)
    }

    fn slice(storage: &Storage) -> Option<&[Self]> {
        match storage {
            Storage::Bool(data) => Some(data),
            _ => None,
        }
    }

    fn to_f64(self) -> f64 {
        if self {
            1.0
        } else {
            0.0
        }
    }

    fn from_f64(value: f64) -> Self {
        value != 0.0
    }
}

// =============================================================================
// Tests
// =============================================================================
