//! IValue - Operator Call Values
//!
//! The tagged values an operator consumes from and pushes onto its stack.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use opbridge_autograd::Variable;

// =============================================================================
// IValue Enum
// =============================================================================

/// A single operator argument or result.
#[derive(Debug, Clone)]
pub enum IValue {
    /// An absent optional value.
    None,
    /// A tensor, possibly tracking gradients.
    Tensor(Variable),
    /// A boolean.
    Bool(bool),
    /// A 64-bit integer.
    Int(i64),
    /// A 64-bit float.
    Float(f64),
    /// A string; only produced by schema defaults.
    Str(String),
    /// A list of integers.
    IntList(Vec<i64>),
    /// A list of floats.
    FloatList(Vec<f64>),
    /// A list of booleans.
    BoolList(Vec<bool>),
}

impl IValue {
    /// Name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Tensor(_) => "Tensor",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::IntList(_) => "int[]",
            Self::FloatList(_) => "float[]",
            Self::BoolList(_) => "bool[]",
        }
    }

    /// Returns true for an absent optional value.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Borrows the tensor.
    pub fn as_tensor(&self) -> Option<&Variable> {
        match self {
            Self::Tensor(v) => Some(v),
            _ => None,
        }
    }

    /// Mutably borrows the tensor.
    pub fn as_tensor_mut(&mut self) -> Option<&mut Variable> {
        match self {
            Self::Tensor(v) => Some(v),
            _ => None,
        }
    }

    /// Takes the tensor.
    pub fn into_tensor(self) -> Option<Variable> {
        match self {
            Self::Tensor(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the integer.
    pub fn to_int(&self) -> Option<i64> {
        match *self {
            Self::Int(i) => Some(i),
            _ => None,
        }
    }

    /// Returns a number as `f64`; integers widen.
    pub fn to_float(&self) -> Option<f64> {
        match *self {
            Self::Float(f) => Some(f),
            Self::Int(i) => Some(i as f64),
            _ => None,
        }
    }

    /// Returns the boolean.
    pub fn to_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Borrows the integer list.
    pub fn as_int_list(&self) -> Option<&[i64]> {
        match self {
            Self::IntList(list) => Some(list),
            _ => None,
        }
    }
}

/// Tensors compare by value; floats compare bit for bit.
impl PartialEq for IValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Tensor(a), Self::Tensor(b)) => a.data() == b.data(),
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::IntList(a), Self::IntList(b)) => a == b,
            (Self::FloatList(a), Self::FloatList(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (Self::BoolList(a), Self::BoolList(b)) => a == b,
            _ => false,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
