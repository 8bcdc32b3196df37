//! Registry - Operator Lookup
//!
//! The bridge sees the operator library only through [`OperatorRegistry`]:
//! look an operator up by name and overload, read its schema, and run it on a
//! value stack. `OperatorTable` is the in-process implementation.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use std::fmt;
use std::sync::Arc;

use opbridge_autograd::Graph;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{BridgeError, BridgeResult};
use crate::ivalue::IValue;
use crate::schema::FunctionSchema;

// =============================================================================
// Operator Name
// =============================================================================

/// Operator name plus overload name; the overload is empty for the default.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperatorName {
    /// Base name, e.g. `add`.
    pub name: String,
    /// Overload, e.g. `Tensor`.
    pub overload: String,
}

impl OperatorName {
    /// Creates an operator name.
    pub fn new(name: impl Into<String>, overload: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overload: overload.into(),
        }
    }
}

impl fmt::Display for OperatorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.overload.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}.{}", self.name, self.overload)
        }
    }
}

// =============================================================================
// Operator Traits
// =============================================================================

/// The operator value stack. Arguments are pushed in order; an operator
/// pops them and pushes its outputs in order.
pub type Stack = Vec<IValue>;

/// A runnable operator.
pub trait Operator: Send + Sync {
    /// The operator's signature.
    fn schema(&self) -> &FunctionSchema;

    /// Pops the arguments off `stack`, records into `graph`, and pushes the outputs.
    fn run(&self, stack: &mut Stack, graph: &mut Graph) -> BridgeResult<()>;
}

/// Source of operators, looked up by name.
pub trait OperatorRegistry: Send + Sync {
    /// Finds an operator.
    fn find(&self, name: &OperatorName) -> Option<Arc<dyn Operator>>;
}

// =============================================================================
// Function-backed Operator
// =============================================================================

/// Signature of a kernel: takes the popped arguments, returns the outputs.
pub type Kernel = dyn Fn(&mut Graph, &[IValue]) -> BridgeResult<Vec<IValue>> + Send + Sync;

/// An operator backed by a schema and a kernel closure.
pub struct FnOperator {
    schema: FunctionSchema,
    kernel: Box<Kernel>,
}

impl FnOperator {
    /// Parses `schema` and pairs it with `kernel`.
    pub fn new<K>(schema: &str, kernel: K) -> BridgeResult<Self>
    where
        K: Fn(&mut Graph, &[IValue]) -> BridgeResult<Vec<IValue>> + Send + Sync + 'static,
    {
        Ok(Self {
            schema: FunctionSchema::parse(schema)?,
            kernel: Box::new(kernel),
        })
    }

    fn name(&self) -> OperatorName {
        OperatorName::new(self.schema.name.clone(), self.schema.overload.clone())
    }
}

impl Operator for FnOperator {
    fn schema(&self) -> &FunctionSchema {
        &self.schema
    }

    fn run(&self, stack: &mut Stack, graph: &mut Graph) -> BridgeResult<()> {
        let count = self.schema.arguments.len();
        if stack.len() < count {
            return Err(BridgeError::ArgumentCountMismatch {
                op: self.name(),
                expected: count,
                actual: stack.len(),
            });
        }
        let arguments = stack.split_off(stack.len() - count);
        let outputs = (self.kernel)(graph, &arguments)?;
        stack.extend(outputs);
        Ok(())
    }
}

impl fmt::Debug for FnOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnOperator")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Operator Table
// =============================================================================

/// In-process registry keyed by operator name.
#[derive(Default)]
pub struct OperatorTable {
    operators: FxHashMap<OperatorName, Arc<dyn Operator>>,
}

impl OperatorTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an operator under the name in its schema.
    pub fn register_operator(&mut self, operator: Arc<dyn Operator>) -> BridgeResult<()> {
        let schema = operator.schema();
        let name = OperatorName::new(schema.name.clone(), schema.overload.clone());
        if self.operators.contains_key(&name) {
            return Err(BridgeError::DuplicateOperator(name));
        }
        debug!(operator = %name, "registered operator");
        self.operators.insert(name, operator);
        Ok(())
    }

    /// Registers a kernel under a schema string.
    pub fn register<K>(&mut self, schema: &str, kernel: K) -> BridgeResult<()>
    where
        K: Fn(&mut Graph, &[IValue]) -> BridgeResult<Vec<IValue>> + Send + Sync + 'static,
    {
        self.register_operator(Arc::new(FnOperator::new(schema, kernel)?))
    }

    /// Returns the number of registered operators.
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<OperatorName> {
        let mut names: Vec<OperatorName> = self.operators.keys().cloned().collect();
        names.sort_by(|a, b| (&a.name, &a.overload).cmp(&(&b.name, &b.overload)));
        names
    }
}

impl OperatorRegistry for OperatorTable {
    fn find(&self, name: &OperatorName) -> Option<Arc<dyn Operator>> {
        self.operators.get(name).cloned()
    }
}

impl fmt::Debug for OperatorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorTable")
            .field("operators", &self.names())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_table() -> OperatorTable {
        let mut table = OperatorTable::new();
        table
            .register("echo.int(int x, int y) -> (int, int)", |_, args| {
                Ok(args.to_vec())
            })
            .unwrap();
        table
    }

    #[test]
    fn test_operator_name_display() {
        assert_eq!(OperatorName::new("add", "Tensor").to_string(), "add.Tensor");
        assert_eq!(OperatorName::new("relu", "").to_string(), "relu");
    }

    #[test]
    fn test_register_and_find() {
        let table = echo_table();
        assert_eq!(table.len(), 1);
        assert!(table.find(&OperatorName::new("echo", "int")).is_some());
        assert!(table.find(&OperatorName::new("echo", "")).is_none());
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut table = echo_table();
        let err = table
            .register("echo.int(int x) -> int", |_, args| Ok(args.to_vec()))
            .unwrap_err();
        assert!(matches!(err, BridgeError::DuplicateOperator(_)));
    }

    #[test]
    fn test_run_pops_arguments_and_pushes_outputs() {
        let table = echo_table();
        let op = table.find(&OperatorName::new("echo", "int")).unwrap();
        let mut graph = Graph::new();

        let mut stack = vec![IValue::Bool(true), IValue::Int(1), IValue::Int(2)];
        op.run(&mut stack, &mut graph).unwrap();
        assert_eq!(
            stack,
            vec![IValue::Bool(true), IValue::Int(1), IValue::Int(2)]
        );

        let mut short = vec![IValue::Int(1)];
        assert!(matches!(
            op.run(&mut short, &mut graph),
            Err(BridgeError::ArgumentCountMismatch { expected: 2, actual: 1, .. })
        ));
    }
}
