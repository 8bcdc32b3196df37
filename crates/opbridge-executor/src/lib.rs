//! OpBridge Executor - Operator Dispatch and Gradient Bridging
//!
//! Lets a host runtime call operators from a schema-described library by
//! name. Arguments arrive as DLPack descriptors, are marshaled against the
//! operator's schema, and the operator runs with optional gradient tracking.
//! A tracked call stores the recorded graph under an integer id; a later
//! backward call replays it and hands back one gradient per flagged input.
//!
//! # Key Features
//! - Schema parsing and a create-on-miss descriptor cache
//! - Scalar and list arguments carried as 0-d or 1-d tensors
//! - Forward graph capture with leaf discovery by breadth-first search
//! - Single-use autograd contexts keyed by id
//! - TOML configuration and `tracing` diagnostics
//!
//! # Example
//! ```rust
//! use opbridge_core::Tensor;
//! use opbridge_executor::{Bridge, BridgeConfig};
//!
//! let bridge = Bridge::with_builtin_library(BridgeConfig::default()).unwrap();
//! let a = Tensor::from_vec(vec![1.0f32, 2.0], &[2]).unwrap();
//! let b = Tensor::from_vec(vec![3.0f32, 4.0], &[2]).unwrap();
//!
//! let mut context_id = -1;
//! let outputs = bridge
//!     .execute_operator(
//!         "mul",
//!         "Tensor",
//!         vec![Some(a.into_dlpack()), Some(b.into_dlpack())],
//!         &[true, true],
//!         Some(&mut context_id),
//!     )
//!     .unwrap();
//! assert_eq!(outputs.len(), 1);
//!
//! let grad = Tensor::from_vec(vec![1.0f32, 1.0], &[2]).unwrap();
//! let grads = bridge
//!     .execute_operator_backward(grad.into_dlpack(), context_id)
//!     .unwrap();
//! let da = Tensor::from_dlpack(grads.into_iter().next().unwrap()).unwrap();
//! assert_eq!(da.to_vec::<f32>().unwrap(), vec![3.0, 4.0]);
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
#![allow(clippy::needless_pass_by_value)]

// =============================================================================
// Modules
// =============================================================================

pub mod backward;
pub mod bridge;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod forward;
pub mod ivalue;
pub mod library;
pub mod marshal;
pub mod registry;
pub mod schema;

// =============================================================================
// Re-exports
// =============================================================================

pub use bridge::Bridge;
pub use cache::{ArgumentSlot, ElementKind, OperatorCache, OperatorDescriptor};
pub use config::{BridgeConfig, CONFIG_ENV};
pub use context::{AutogradContext, ContextStore};
pub use error::{BridgeError, BridgeResult, ErrorClass};
pub use ivalue::IValue;
pub use library::builtin_library;
pub use registry::{FnOperator, Operator, OperatorName, OperatorRegistry, OperatorTable, Stack};
pub use schema::{ArgType, Argument, FunctionSchema, Return};
