//! Error - Bridge Error Types
//!
//! Every failure the bridge can report, grouped by [`ErrorClass`]. None of
//! them are recoverable: they signal a broken contract between the caller,
//! the exported model and the operator library.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use opbridge_core::DLDataType;
use thiserror::Error;

use crate::registry::OperatorName;

// =============================================================================
// Error Class
// =============================================================================

/// Which contract an error breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The call does not fit the operator's schema.
    SchemaMismatch,
    /// The recorded graph does not have the expected structure.
    StructuralInconsistency,
    /// The bridge itself was used incorrectly.
    Misuse,
}

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by the operator bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// No operator is registered under this name.
    #[error("Unknown operator: {0}")]
    UnknownOperator(OperatorName),

    /// The operator's schema uses a construct the bridge cannot marshal.
    #[error("Unsupported schema for {op}: {reason}")]
    UnsupportedSchema {
        /// Operator name.
        op: OperatorName,
        /// What is unsupported.
        reason: String,
    },

    /// A schema string could not be parsed.
    #[error("Cannot parse schema '{schema}': {reason}")]
    SchemaParse {
        /// The schema text.
        schema: String,
        /// What went wrong.
        reason: String,
    },

    /// An operator with this name is already registered.
    #[error("Operator {0} is already registered")]
    DuplicateOperator(OperatorName),

    /// Argument index past the end of the schema.
    #[error("Argument index {index} out of range for {op} with {count} arguments")]
    ArgumentIndexOutOfRange {
        /// Operator name.
        op: OperatorName,
        /// Requested index.
        index: usize,
        /// Number of arguments.
        count: usize,
    },

    /// Wrong number of arguments supplied.
    #[error("{op} expects {expected} arguments, got {actual}")]
    ArgumentCountMismatch {
        /// Operator name.
        op: OperatorName,
        /// Schema argument count.
        expected: usize,
        /// Supplied argument count.
        actual: usize,
    },

    /// An absent argument has neither an optional type nor a default.
    #[error("Argument '{argument}' of {op} is required")]
    MissingArgument {
        /// Operator name.
        op: OperatorName,
        /// Argument name.
        argument: String,
    },

    /// A value was supplied for an argument kind the bridge cannot convert.
    #[error("Argument '{argument}' of {op} has unsupported kind {kind}")]
    UnsupportedKind {
        /// Operator name.
        op: OperatorName,
        /// Argument name.
        argument: String,
        /// The schema type.
        kind: String,
    },

    /// The descriptor's element type does not match the argument kind.
    #[error("Argument '{argument}' of {op} expects {expected} data, got {actual}")]
    ArgumentType {
        /// Operator name.
        op: OperatorName,
        /// Argument name.
        argument: String,
        /// Accepted element types.
        expected: &'static str,
        /// Supplied element type.
        actual: DLDataType,
    },

    /// The descriptor's shape does not fit a scalar or list argument.
    #[error("Argument '{argument}' of {op} expects {expected}, got shape {shape:?}")]
    ArgumentShape {
        /// Operator name.
        op: OperatorName,
        /// Argument name.
        argument: String,
        /// Accepted layout.
        expected: &'static str,
        /// Supplied shape.
        shape: Vec<i64>,
    },

    /// A kernel received a value of the wrong type.
    #[error("Kernel argument {index} expects {expected}, got {actual}")]
    KernelArgument {
        /// Argument position.
        index: usize,
        /// Expected value type.
        expected: &'static str,
        /// Received value type.
        actual: &'static str,
    },

    /// More gradient flags than arguments.
    #[error("{op} got {flags} gradient flags for {arguments} arguments")]
    FlagCountMismatch {
        /// Operator name.
        op: OperatorName,
        /// Number of flags.
        flags: usize,
        /// Number of arguments.
        arguments: usize,
    },

    /// A flagged argument is not a present tensor.
    #[error("Argument {index} of {op} is flagged for gradients but is not a tensor")]
    FlaggedNonTensor {
        /// Operator name.
        op: OperatorName,
        /// Argument position.
        index: usize,
    },

    /// A context id slot was supplied without tracking, or the reverse.
    #[error("Context id must be supplied exactly when gradient flags are non-empty (tracking: {tracking})")]
    ContextIdMismatch {
        /// Whether tracking was requested.
        tracking: bool,
    },

    /// The operator returned a non-tensor value.
    #[error("Output {index} of {op} is {actual}, not a tensor")]
    NonTensorOutput {
        /// Operator name.
        op: OperatorName,
        /// Output position.
        index: usize,
        /// Type of the returned value.
        actual: &'static str,
    },

    /// The operator left the wrong number of values on the stack.
    #[error("{op} should produce {expected} outputs, produced {actual}")]
    OutputCountMismatch {
        /// Operator name.
        op: OperatorName,
        /// Schema output count.
        expected: usize,
        /// Values produced.
        actual: usize,
    },

    /// The first output has no producing node while tracking.
    #[error("First output of {op} is not attached to a graph")]
    MissingRoot {
        /// Operator name.
        op: OperatorName,
    },

    /// No accumulation node for a flagged input is reachable from the root.
    #[error("Flagged argument {index} of {op} is not reachable from its output")]
    UnreachableInput {
        /// Operator name.
        op: OperatorName,
        /// Argument position.
        index: usize,
    },

    /// An edge points outside the graph.
    #[error("Graph has no node {0}")]
    DanglingEdge(String),

    /// A node returned a different number of gradients than it has edges.
    #[error("{node} returned {actual} gradients for {expected} edges")]
    GradientCountMismatch {
        /// Node name.
        node: &'static str,
        /// Edge count.
        expected: usize,
        /// Gradient count.
        actual: usize,
    },

    /// A recorded leaf received no gradient.
    #[error("Leaf {index} received no gradient")]
    MissingGradient {
        /// Position in flagged-input order.
        index: usize,
    },

    /// No pending context has this id.
    #[error("Unknown autograd context {0}")]
    UnknownContext(i64),

    /// A bridge entry point was called before a bridge was installed.
    #[error("Operator bridge is not initialized")]
    NotInitialized,

    /// Tensor or interchange failure.
    #[error(transparent)]
    Core(#[from] opbridge_core::Error),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    /// Returns which contract this error breaks.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::UnknownOperator(_)
            | Self::UnsupportedSchema { .. }
            | Self::SchemaParse { .. }
            | Self::ArgumentIndexOutOfRange { .. }
            | Self::ArgumentCountMismatch { .. }
            | Self::MissingArgument { .. }
            | Self::UnsupportedKind { .. }
            | Self::ArgumentType { .. }
            | Self::ArgumentShape { .. }
            | Self::KernelArgument { .. }
            | Self::NonTensorOutput { .. }
            | Self::OutputCountMismatch { .. }
            | Self::Core(_) => ErrorClass::SchemaMismatch,
            Self::MissingRoot { .. }
            | Self::UnreachableInput { .. }
            | Self::DanglingEdge(_)
            | Self::GradientCountMismatch { .. }
            | Self::MissingGradient { .. } => ErrorClass::StructuralInconsistency,
            Self::DuplicateOperator(_)
            | Self::FlagCountMismatch { .. }
            | Self::FlaggedNonTensor { .. }
            | Self::ContextIdMismatch { .. }
            | Self::UnknownContext(_)
            | Self::NotInitialized
            | Self::Config(_)
            | Self::Io(_) => ErrorClass::Misuse,
        }
    }
}

// =============================================================================
// Error Conversion
// =============================================================================

impl From<toml::de::Error> for BridgeError {
    fn from(e: toml::de::Error) -> Self {
        BridgeError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for BridgeError {
    fn from(e: toml::ser::Error) -> Self {
        BridgeError::Config(e.to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================
