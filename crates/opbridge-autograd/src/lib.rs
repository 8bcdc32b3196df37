//! OpBridge Autograd - Differentiation Graph for Bridged Operators
//!
//! Records the operations an operator performs on gradient-tracking values
//! into a per-call arena graph, so that a caller can later replay the graph
//! backward and collect gradients for the inputs it flagged.
//!
//! # Key Features
//!
//! - **Arena Graph** - Nodes addressed by `NodeId`, edges are `Option<NodeId>`
//! - **Accumulation Nodes** - One `AccumulateGrad` per leaf gradient slot
//! - **Gradient Functions** - Add, Sub, Mul, Neg, Relu, LeakyRelu, Sum,
//!   SumDim, Transpose and Min/Max
//! - **Gradient Mode** - Thread-local switch with RAII guards
//!
//! # Example
//!
//! ```rust
//! use opbridge_autograd::{ops, Graph, Variable};
//! use opbridge_core::Tensor;
//!
//! let mut graph = Graph::new();
//! let a = Variable::new(Tensor::from_vec(vec![1.0f32, 2.0], &[2]).unwrap(), true);
//! let b = Variable::new(Tensor::from_vec(vec![3.0f32, 4.0], &[2]).unwrap(), true);
//!
//! let c = ops::mul(&mut graph, &a, &b).unwrap();
//! let root = c.grad_fn().unwrap();
//! assert_eq!(graph.node(root).unwrap().name(), "MulBackward");
//! assert_eq!(graph.node(root).unwrap().next_edges().len(), 2);
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
#![allow(clippy::new_without_default)]

// =============================================================================
// Modules
// =============================================================================

pub mod functions;
pub mod grad_fn;
pub mod grad_mode;
pub mod graph;
pub mod ops;
pub mod variable;

// =============================================================================
// Re-exports
// =============================================================================

pub use grad_fn::{AccumulateGrad, GradAccumulator, GradSlotId, GradientFunction};
pub use grad_mode::{enable_grad, is_grad_enabled, no_grad, GradModeGuard, NoGradGuard};
pub use graph::{Graph, Node, NodeId, NodeKind};
pub use variable::Variable;

// =============================================================================
// Tests
// =============================================================================
