//! Gradient Functions - Backward Implementations
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

mod activation;
mod basic;
mod reduce;

pub use activation::{LeakyReluBackward, ReluBackward};
pub use basic::{AddBackward, MulBackward, NegBackward, SubBackward};
pub use reduce::{ExtremumBackward, SumBackward, SumDimBackward, TransposeBackward};
