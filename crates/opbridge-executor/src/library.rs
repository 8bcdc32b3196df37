//! Library - Reference Operators
//!
//! A small operator library registered from schema strings. It gives the
//! bridge something real to dispatch to, with gradient support through
//! `opbridge_autograd::ops`.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use opbridge_autograd::{ops, Variable};
use opbridge_core::shape::normalize_dim;

use crate::error::{BridgeError, BridgeResult};
use crate::ivalue::IValue;
use crate::registry::OperatorTable;

// =============================================================================
// Library
// =============================================================================

/// Builds a table holding the reference operators.
pub fn builtin_library() -> BridgeResult<OperatorTable> {
    let mut table = OperatorTable::new();

    table.register(
        "add.Tensor(Tensor self, Tensor other, *, Scalar alpha=1) -> Tensor",
        |graph, args| {
            let out = ops::add(graph, tensor(args, 0)?, tensor(args, 1)?, number(args, 2)?)?;
            Ok(vec![IValue::Tensor(out)])
        },
    )?;
    table.register(
        "sub.Tensor(Tensor self, Tensor other, *, Scalar alpha=1) -> Tensor",
        |graph, args| {
            let out = ops::sub(graph, tensor(args, 0)?, tensor(args, 1)?, number(args, 2)?)?;
            Ok(vec![IValue::Tensor(out)])
        },
    )?;
    table.register(
        "mul.Tensor(Tensor self, Tensor other) -> Tensor",
        |graph, args| {
            let out = ops::mul(graph, tensor(args, 0)?, tensor(args, 1)?)?;
            Ok(vec![IValue::Tensor(out)])
        },
    )?;
    table.register("neg(Tensor self) -> Tensor", |graph, args| {
        Ok(vec![IValue::Tensor(ops::neg(graph, tensor(args, 0)?)?)])
    })?;
    table.register("relu(Tensor self) -> Tensor", |graph, args| {
        Ok(vec![IValue::Tensor(ops::relu(graph, tensor(args, 0)?)?)])
    })?;
    table.register(
        "leaky_relu(Tensor self, float negative_slope=0.01) -> Tensor",
        |graph, args| {
            let out = ops::leaky_relu(graph, tensor(args, 0)?, number(args, 1)?)?;
            Ok(vec![IValue::Tensor(out)])
        },
    )?;
    table.register(
        "sum(Tensor self, *, ScalarType? dtype=None) -> Tensor",
        |graph, args| Ok(vec![IValue::Tensor(ops::sum(graph, tensor(args, 0)?)?)]),
    )?;
    table.register(
        "sum.dim_IntList(Tensor self, int[1]? dim, bool keepdim=False, *, ScalarType? dtype=None) -> Tensor",
        |graph, args| {
            let input = tensor(args, 0)?;
            let dims = dim_list(args, 1, input.shape().len())?;
            let out = ops::sum_dims(graph, input, &dims, boolean(args, 2)?)?;
            Ok(vec![IValue::Tensor(out)])
        },
    )?;
    table.register(
        "transpose.int(Tensor(a) self, int dim0, int dim1) -> Tensor(a)",
        |graph, args| {
            let input = tensor(args, 0)?;
            let ndim = input.shape().len();
            let dim0 = normalize_dim(int(args, 1)?, ndim)?;
            let dim1 = normalize_dim(int(args, 2)?, ndim)?;
            Ok(vec![IValue::Tensor(ops::transpose(graph, input, dim0, dim1)?)])
        },
    )?;
    table.register(
        "aminmax(Tensor self) -> (Tensor min, Tensor max)",
        |graph, args| {
            let (min, max) = ops::aminmax(graph, tensor(args, 0)?)?;
            Ok(vec![IValue::Tensor(min), IValue::Tensor(max)])
        },
    )?;

    Ok(table)
}

// =============================================================================
// Argument Helpers
// =============================================================================

fn kernel_error(args: &[IValue], index: usize, expected: &'static str) -> BridgeError {
    BridgeError::KernelArgument {
        index,
        expected,
        actual: args.get(index).map_or("nothing", IValue::type_name),
    }
}

fn tensor(args: &[IValue], index: usize) -> BridgeResult<&Variable> {
    args.get(index)
        .and_then(IValue::as_tensor)
        .ok_or_else(|| kernel_error(args, index, "Tensor"))
}

fn number(args: &[IValue], index: usize) -> BridgeResult<f64> {
    args.get(index)
        .and_then(IValue::to_float)
        .ok_or_else(|| kernel_error(args, index, "number"))
}

fn int(args: &[IValue], index: usize) -> BridgeResult<i64> {
    args.get(index)
        .and_then(IValue::to_int)
        .ok_or_else(|| kernel_error(args, index, "int"))
}

fn boolean(args: &[IValue], index: usize) -> BridgeResult<bool> {
    args.get(index)
        .and_then(IValue::to_bool)
        .ok_or_else(|| kernel_error(args, index, "bool"))
}

/// Normalized dimensions; `None` or an empty list selects every dimension.
fn dim_list(args: &[IValue], index: usize, ndim: usize) -> BridgeResult<Vec<usize>> {
    match args.get(index) {
        Some(IValue::None) => Ok(Vec::new()),
        Some(IValue::IntList(dims)) => {
            let mut dims = dims
                .iter()
                .map(|&d| normalize_dim(d, ndim))
                .collect::<Result<Vec<_>, _>>()?;
            dims.sort_unstable();
            dims.dedup();
            Ok(dims)
        }
        _ => Err(kernel_error(args, index, "int[]?")),
    }
}

// =============================================================================
// Tests
// =============================================================================
