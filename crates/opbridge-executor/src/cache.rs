//! Cache - Operator Descriptors
//!
//! Resolving an operator means looking it up in the registry and flattening
//! its schema into one [`ArgumentSlot`] per argument. The result is cached per
//! (name, overload) for the life of the cache and never invalidated.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{BridgeError, BridgeResult};
use crate::ivalue::IValue;
use crate::registry::{Operator, OperatorName, OperatorRegistry};
use crate::schema::{ArgType, Argument};

// =============================================================================
// Argument Slots
// =============================================================================

/// Element kind of an argument once optional and list wrappers are removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    /// Tensor value.
    Tensor,
    /// 64-bit integer.
    Int,
    /// Float.
    Float,
    /// Boolean.
    Bool,
    /// Anything else; representable, but cannot be supplied by the caller.
    Other(String),
}

/// Marshaling recipe for one argument.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentSlot {
    /// Argument name.
    pub name: String,
    /// Element kind.
    pub kind: ElementKind,
    /// Declared as a list.
    pub is_list: bool,
    /// Declared optional.
    pub is_optional: bool,
    /// Schema default.
    pub default: Option<IValue>,
}

impl ArgumentSlot {
    fn from_argument(op: &OperatorName, argument: &Argument) -> BridgeResult<Self> {
        let (is_optional, ty) = match &argument.ty {
            ArgType::Optional(inner) => (true, inner.as_ref()),
            ty => (false, ty),
        };
        let (is_list, elem) = match ty {
            ArgType::List(elem, _) => (true, elem.as_ref()),
            ty => (false, ty),
        };
        let kind = match elem {
            ArgType::Tensor if is_list => {
                return Err(BridgeError::UnsupportedSchema {
                    op: op.clone(),
                    reason: format!("tensor-list argument '{}'", argument.name),
                })
            }
            ArgType::Tensor => ElementKind::Tensor,
            ArgType::Int => ElementKind::Int,
            ArgType::Float => ElementKind::Float,
            ArgType::Bool => ElementKind::Bool,
            other => ElementKind::Other(other.to_string()),
        };
        Ok(Self {
            name: argument.name.clone(),
            kind,
            is_list,
            is_optional,
            default: argument.default.clone(),
        })
    }
}

// =============================================================================
// Operator Descriptor
// =============================================================================

/// A resolved operator and its flattened signature.
pub struct OperatorDescriptor {
    name: OperatorName,
    operator: Arc<dyn Operator>,
    slots: Vec<ArgumentSlot>,
    output_count: usize,
}

impl OperatorDescriptor {
    /// Builds a descriptor, rejecting tensor-list arguments and non-tensor returns.
    pub fn new(name: OperatorName, operator: Arc<dyn Operator>) -> BridgeResult<Self> {
        let schema = operator.schema();
        let slots = schema
            .arguments
            .iter()
            .map(|argument| ArgumentSlot::from_argument(&name, argument))
            .collect::<BridgeResult<Vec<_>>>()?;

        if let Some(ret) = schema.returns.iter().find(|r| r.ty != ArgType::Tensor) {
            return Err(BridgeError::UnsupportedSchema {
                op: name,
                reason: format!("non-tensor return {}", ret.ty),
            });
        }
        let output_count = schema.returns.len();

        Ok(Self {
            name,
            operator,
            slots,
            output_count,
        })
    }

    /// The operator's name.
    pub fn name(&self) -> &OperatorName {
        &self.name
    }

    /// The runnable operator.
    pub fn operator(&self) -> &Arc<dyn Operator> {
        &self.operator
    }

    /// One slot per argument, in order.
    pub fn slots(&self) -> &[ArgumentSlot] {
        &self.slots
    }

    /// Number of arguments.
    pub fn argument_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of outputs.
    pub fn output_count(&self) -> usize {
        self.output_count
    }

    /// Whether argument `index` is a tensor, as opposed to a host-side value.
    pub fn is_tensor_argument(&self, index: usize) -> BridgeResult<bool> {
        self.slots
            .get(index)
            .map(|slot| slot.kind == ElementKind::Tensor)
            .ok_or_else(|| BridgeError::ArgumentIndexOutOfRange {
                op: self.name.clone(),
                index,
                count: self.slots.len(),
            })
    }
}

impl fmt::Debug for OperatorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorDescriptor")
            .field("name", &self.name)
            .field("slots", &self.slots)
            .field("output_count", &self.output_count)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Operator Cache
// =============================================================================

/// Create-on-miss cache of operator descriptors.
pub struct OperatorCache {
    registry: Arc<dyn OperatorRegistry>,
    entries: RwLock<FxHashMap<OperatorName, Arc<OperatorDescriptor>>>,
}

impl OperatorCache {
    /// Creates an empty cache over `registry`.
    pub fn new(registry: Arc<dyn OperatorRegistry>) -> Self {
        Self {
            registry,
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    /// Returns the descriptor for `name.overload`, building it on first use.
    pub fn resolve(&self, name: &str, overload: &str) -> BridgeResult<Arc<OperatorDescriptor>> {
        let key = OperatorName::new(name, overload);
        if let Some(descriptor) = self.entries.read().get(&key) {
            return Ok(Arc::clone(descriptor));
        }

        let operator = self
            .registry
            .find(&key)
            .ok_or_else(|| BridgeError::UnknownOperator(key.clone()))?;
        let descriptor = Arc::new(OperatorDescriptor::new(key.clone(), operator)?);

        let mut entries = self.entries.write();
        // Another thread may have resolved the same key meanwhile; keep the first.
        let entry = entries.entry(key).or_insert_with(|| {
            debug!(
                operator = %descriptor.name(),
                arguments = descriptor.argument_count(),
                outputs = descriptor.output_count(),
                "cached operator descriptor"
            );
            Arc::clone(&descriptor)
        });
        Ok(Arc::clone(entry))
    }

    /// Number of cached descriptors.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for OperatorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorCache")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
