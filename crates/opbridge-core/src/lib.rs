//! OpBridge Core - Tensors and Interchange for the Operator Bridge
//!
//! This crate provides the value types that every other OpBridge crate builds
//! on: the runtime data type system, a dense CPU tensor, and the DLPack
//! compatible interchange descriptors used to move tensors across the
//! language boundary.
//!
//! # Key Features
//! - Runtime dtype information via `DType` (f32, f64, i32, i64, u8, bool)
//! - Reference-counted tensor storage with copy-on-write in-place updates
//! - Broadcasting element-wise math for the reference operator library
//! - `#[repr(C)]` DLPack structs and an owning `ManagedTensor` wrapper
//!
//! # Example
//! ```rust
//! use opbridge_core::Tensor;
//!
//! let a = Tensor::from_vec(vec![1.0f32, 2.0, 3.0], &[3]).unwrap();
//! let b = Tensor::from_vec(vec![10.0f32], &[1]).unwrap();
//! let c = a.add(&b).unwrap();
//! assert_eq!(c.to_vec::<f32>().unwrap(), vec![11.0, 12.0, 13.0]);
//!
//! // Round trip through the interchange format
//! let managed = c.into_dlpack();
//! let back = Tensor::from_dlpack(managed).unwrap();
//! assert_eq!(back.shape(), &[3]);
//! ```
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::similar_names)]

// =============================================================================
// Modules
// =============================================================================

pub mod dlpack;
pub mod dtype;
pub mod error;
pub mod shape;
pub mod storage;
pub mod tensor;

// =============================================================================
// Re-exports
// =============================================================================

pub use dlpack::{DLDataType, DLDevice, DLManagedTensor, DLTensor, ManagedTensor};
pub use dtype::{DType, Element};
pub use error::{Error, Result};
pub use shape::Shape;
pub use storage::Storage;
pub use tensor::{Extremum, Tensor};
