//! Marshal - Descriptors to Call Arguments
//!
//! Converts the caller's positional DLPack descriptors into one `IValue` per
//! schema argument. Host-side values (ints, floats, bools) travel as small
//! tensors: a scalar argument is a 0-d or single-element 1-d tensor, a list
//! argument is a 1-d tensor.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use opbridge_autograd::Variable;
use opbridge_core::{DLDataType, ManagedTensor, Tensor};

use crate::cache::{ArgumentSlot, ElementKind, OperatorDescriptor};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::ivalue::IValue;

// =============================================================================
// Options
// =============================================================================

/// Element-type leniency switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarshalOptions {
    /// Accept int64 data for boolean arguments.
    pub coerce_int64_bool: bool,
    /// Accept float64 data for float arguments.
    pub accept_float64_scalars: bool,
}

impl Default for MarshalOptions {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl From<&BridgeConfig> for MarshalOptions {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            coerce_int64_bool: config.coerce_int64_bool,
            accept_float64_scalars: config.accept_float64_scalars,
        }
    }
}

// =============================================================================
// Marshaling
// =============================================================================

/// Converts one (possibly absent) descriptor per slot into call arguments.
pub fn marshal_arguments(
    descriptor: &OperatorDescriptor,
    arguments: Vec<Option<ManagedTensor>>,
    options: MarshalOptions,
) -> BridgeResult<Vec<IValue>> {
    if arguments.len() != descriptor.argument_count() {
        return Err(BridgeError::ArgumentCountMismatch {
            op: descriptor.name().clone(),
            expected: descriptor.argument_count(),
            actual: arguments.len(),
        });
    }
    descriptor
        .slots()
        .iter()
        .zip(arguments)
        .map(|(slot, argument)| marshal_argument(descriptor, slot, argument, options))
        .collect()
}

/// Converts a single argument.
pub fn marshal_argument(
    descriptor: &OperatorDescriptor,
    slot: &ArgumentSlot,
    argument: Option<ManagedTensor>,
    options: MarshalOptions,
) -> BridgeResult<IValue> {
    let Some(managed) = argument else {
        if slot.is_optional {
            return Ok(IValue::None);
        }
        return slot.default.clone().ok_or_else(|| BridgeError::MissingArgument {
            op: descriptor.name().clone(),
            argument: slot.name.clone(),
        });
    };

    let values = match &slot.kind {
        ElementKind::Tensor => {
            let tensor = Tensor::from_dlpack(managed)?;
            return Ok(IValue::Tensor(Variable::from_tensor(tensor)));
        }
        ElementKind::Other(kind) => {
            return Err(BridgeError::UnsupportedKind {
                op: descriptor.name().clone(),
                argument: slot.name.clone(),
                kind: kind.clone(),
            })
        }
        kind => {
            check_layout(descriptor, slot, &managed)?;
            read_values(descriptor, slot, kind, &managed, options)?
        }
    };

    Ok(match (values, slot.is_list) {
        (Values::Int(v), true) => IValue::IntList(v),
        (Values::Float(v), true) => IValue::FloatList(v),
        (Values::Bool(v), true) => IValue::BoolList(v),
        (Values::Int(v), false) => IValue::Int(v[0]),
        (Values::Float(v), false) => IValue::Float(v[0]),
        (Values::Bool(v), false) => IValue::Bool(v[0]),
    })
}

/// Host values read out of a descriptor.
enum Values {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Bool(Vec<bool>),
}

fn check_layout(
    descriptor: &OperatorDescriptor,
    slot: &ArgumentSlot,
    managed: &ManagedTensor,
) -> BridgeResult<()> {
    let (ok, expected) = if slot.is_list {
        (managed.ndim() == 1, "a 1-d list")
    } else {
        (managed.is_single_element(), "a single element")
    };
    if ok {
        Ok(())
    } else {
        Err(BridgeError::ArgumentShape {
            op: descriptor.name().clone(),
            argument: slot.name.clone(),
            expected,
            shape: managed.shape().to_vec(),
        })
    }
}

fn read_values(
    descriptor: &OperatorDescriptor,
    slot: &ArgumentSlot,
    kind: &ElementKind,
    managed: &ManagedTensor,
    options: MarshalOptions,
) -> BridgeResult<Values> {
    let dtype = managed.dtype();
    let mismatch = |expected: &'static str| BridgeError::ArgumentType {
        op: descriptor.name().clone(),
        argument: slot.name.clone(),
        expected,
        actual: dtype,
    };

    let values = match kind {
        ElementKind::Int if dtype == DLDataType::INT64 => Values::Int(managed.read_elements()?),
        ElementKind::Int => return Err(mismatch("int64")),

        ElementKind::Float if dtype == DLDataType::FLOAT32 => Values::Float(
            managed
                .read_elements::<f32>()?
                .into_iter()
                .map(f64::from)
                .collect(),
        ),
        ElementKind::Float if dtype == DLDataType::FLOAT64 && options.accept_float64_scalars => {
            Values::Float(managed.read_elements()?)
        }
        ElementKind::Float if options.accept_float64_scalars => {
            return Err(mismatch("float32 or float64"))
        }
        ElementKind::Float => return Err(mismatch("float32")),

        ElementKind::Bool if dtype == DLDataType::UINT8 || dtype == DLDataType::BOOL => {
            Values::Bool(
                managed
                    .read_elements::<u8>()?
                    .into_iter()
                    .map(|b| b != 0)
                    .collect(),
            )
        }
        ElementKind::Bool if dtype == DLDataType::INT64 && options.coerce_int64_bool => {
            Values::Bool(
                managed
                    .read_elements::<i64>()?
                    .into_iter()
                    .map(|v| v != 0)
                    .collect(),
            )
        }
        ElementKind::Bool => return Err(mismatch("uint8 or bool")),

        ElementKind::Tensor | ElementKind::Other(_) => {
            return Err(BridgeError::UnsupportedKind {
                op: descriptor.name().clone(),
                argument: slot.name.clone(),
                kind: format!("{kind:?}"),
            })
        }
    };
    Ok(values)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::OperatorCache;
    use crate::library::builtin_library;
    use crate::registry::OperatorTable;
    use std::sync::Arc;

    fn descriptor(name: &str, overload: &str) -> Arc<OperatorDescriptor> {
        OperatorCache::new(Arc::new(builtin_library().unwrap()))
            .resolve(name, overload)
            .unwrap()
    }

    fn dl<T: opbridge_core::Element>(data: Vec<T>, shape: &[usize]) -> Option<ManagedTensor> {
        Some(Tensor::from_vec(data, shape).unwrap().into_dlpack())
    }

    fn slot<'a>(desc: &'a OperatorDescriptor, name: &str) -> &'a ArgumentSlot {
        desc.slots().iter().find(|s| s.name == name).unwrap()
    }

    #[test]
    fn test_scalar_kinds() {
        let desc = descriptor("transpose", "int");
        let dim0 = slot(&desc, "dim0");
        let opts = MarshalOptions::default();
        assert_eq!(
            marshal_argument(&desc, dim0, dl(vec![-2i64], &[]), opts).unwrap(),
            IValue::Int(-2)
        );
        assert_eq!(
            marshal_argument(&desc, dim0, dl(vec![5i64], &[1]), opts).unwrap(),
            IValue::Int(5)
        );

        let desc = descriptor("leaky_relu", "");
        let slope = slot(&desc, "negative_slope");
        assert_eq!(
            marshal_argument(&desc, slope, dl(vec![0.25f32], &[]), opts).unwrap(),
            IValue::Float(0.25)
        );
        assert_eq!(
            marshal_argument(&desc, slope, dl(vec![0.2f64], &[]), opts).unwrap(),
            IValue::Float(0.2)
        );

        let desc = descriptor("sum", "dim_IntList");
        let keepdim = slot(&desc, "keepdim");
        assert_eq!(
            marshal_argument(&desc, keepdim, dl(vec![1u8], &[]), opts).unwrap(),
            IValue::Bool(true)
        );
        assert_eq!(
            marshal_argument(&desc, keepdim, dl(vec![false], &[1]), opts).unwrap(),
            IValue::Bool(false)
        );
    }

    #[test]
    fn test_scalar_layout_rejected() {
        let desc = descriptor("transpose", "int");
        let dim0 = slot(&desc, "dim0");
        let opts = MarshalOptions::default();
        for (data, shape) in [(vec![1i64, 2], vec![2]), (vec![1i64], vec![1, 1])] {
            assert!(matches!(
                marshal_argument(&desc, dim0, dl(data, &shape), opts),
                Err(BridgeError::ArgumentShape { .. })
            ));
        }
    }

    #[test]
    fn test_int64_bool_coercion() {
        let desc = descriptor("sum", "dim_IntList");
        let keepdim = slot(&desc, "keepdim");
        let on = MarshalOptions::default();
        assert_eq!(
            marshal_argument(&desc, keepdim, dl(vec![7i64], &[]), on).unwrap(),
            IValue::Bool(true)
        );

        let off = MarshalOptions {
            coerce_int64_bool: false,
            ..on
        };
        assert!(matches!(
            marshal_argument(&desc, keepdim, dl(vec![7i64], &[]), off),
            Err(BridgeError::ArgumentType { expected: "uint8 or bool", .. })
        ));
    }

    #[test]
    fn test_element_type_mismatch() {
        let desc = descriptor("transpose", "int");
        let dim0 = slot(&desc, "dim0");
        let err = marshal_argument(&desc, dim0, dl(vec![1i32], &[]), MarshalOptions::default())
            .unwrap_err();
        assert!(matches!(err, BridgeError::ArgumentType { expected: "int64", .. }));

        let desc = descriptor("leaky_relu", "");
        let slope = slot(&desc, "negative_slope");
        let strict = MarshalOptions {
            accept_float64_scalars: false,
            ..MarshalOptions::default()
        };
        assert!(marshal_argument(&desc, slope, dl(vec![0.5f64], &[]), strict).is_err());
    }

    #[test]
    fn test_list_argument() {
        let desc = descriptor("sum", "dim_IntList");
        let dim = slot(&desc, "dim");
        let opts = MarshalOptions::default();
        assert_eq!(
            marshal_argument(&desc, dim, dl(vec![0i64, -1], &[2]), opts).unwrap(),
            IValue::IntList(vec![0, -1])
        );
        assert!(marshal_argument(&desc, dim, dl(vec![0i64], &[]), opts).is_err());
    }

    fn list_descriptor() -> Arc<OperatorDescriptor> {
        let mut table = OperatorTable::new();
        table
            .register(
                "weigh(Tensor self, bool[] flags, float[] weights, bool[2]? mask) -> Tensor",
                |_, args| Ok(vec![args[0].clone()]),
            )
            .unwrap();
        OperatorCache::new(Arc::new(table)).resolve("weigh", "").unwrap()
    }

    #[test]
    fn test_bool_and_float_lists() {
        let desc = list_descriptor();
        let opts = MarshalOptions::default();
        assert_eq!(
            marshal_argument(&desc, slot(&desc, "flags"), dl(vec![0i64, 3, -1], &[3]), opts)
                .unwrap(),
            IValue::BoolList(vec![false, true, true])
        );
        assert_eq!(
            marshal_argument(&desc, slot(&desc, "weights"), dl(vec![0.5f32, 1.5], &[2]), opts)
                .unwrap(),
            IValue::FloatList(vec![0.5, 1.5])
        );
        assert_eq!(
            marshal_argument(&desc, slot(&desc, "mask"), dl(vec![true, false], &[2]), opts)
                .unwrap(),
            IValue::BoolList(vec![true, false])
        );
        assert_eq!(
            marshal_argument(&desc, slot(&desc, "mask"), None, opts).unwrap(),
            IValue::None
        );
    }

    #[test]
    fn test_bool_list_rejects_int64_without_coercion() {
        let desc = list_descriptor();
        let strict = MarshalOptions {
            coerce_int64_bool: false,
            ..MarshalOptions::default()
        };
        assert!(matches!(
            marshal_argument(&desc, slot(&desc, "flags"), dl(vec![0i64, 1], &[2]), strict),
            Err(BridgeError::ArgumentType { expected: "uint8 or bool", .. })
        ));
    }

    #[test]
    fn test_list_slot_rejects_zero_dim() {
        let desc = list_descriptor();
        let opts = MarshalOptions::default();
        assert!(matches!(
            marshal_argument(&desc, slot(&desc, "weights"), dl(vec![0.5f32], &[]), opts),
            Err(BridgeError::ArgumentShape { expected: "a 1-d list", .. })
        ));
        assert!(matches!(
            marshal_argument(&desc, slot(&desc, "flags"), dl(vec![1u8], &[]), opts),
            Err(BridgeError::ArgumentShape { .. })
        ));
    }

    #[test]
    fn test_absent_arguments() {
        let desc = descriptor("sum", "dim_IntList");
        let opts = MarshalOptions::default();
        assert_eq!(
            marshal_argument(&desc, slot(&desc, "dim"), None, opts).unwrap(),
            IValue::None
        );
        assert_eq!(
            marshal_argument(&desc, slot(&desc, "keepdim"), None, opts).unwrap(),
            IValue::Bool(false)
        );
        assert!(matches!(
            marshal_argument(&desc, slot(&desc, "self"), None, opts),
            Err(BridgeError::MissingArgument { .. })
        ));
    }

    #[test]
    fn test_present_unsupported_kind() {
        let desc = descriptor("add", "Tensor");
        let err = marshal_argument(
            &desc,
            slot(&desc, "alpha"),
            dl(vec![2i64], &[]),
            MarshalOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::UnsupportedKind { .. }));
    }

    #[test]
    fn test_argument_count() {
        let desc = descriptor("neg", "");
        let err = marshal_arguments(&desc, vec![None, None], MarshalOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::ArgumentCountMismatch { expected: 1, actual: 2, .. }
        ));
    }
}
