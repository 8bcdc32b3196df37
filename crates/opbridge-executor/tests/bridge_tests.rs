//! Bridge Tests - End-to-end dispatch through DLPack descriptors
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use std::sync::Arc;
use std::thread;

use opbridge_autograd::ops;
use opbridge_core::{ManagedTensor, Tensor};
use opbridge_executor::{
    Bridge, BridgeConfig, BridgeError, ErrorClass, IValue, OperatorTable,
};

// =============================================================================
// Helpers
// =============================================================================

fn bridge() -> Bridge {
    Bridge::with_builtin_library(BridgeConfig::default()).unwrap()
}

fn floats(data: &[f32], shape: &[usize]) -> Option<ManagedTensor> {
    Some(Tensor::from_vec(data.to_vec(), shape).unwrap().into_dlpack())
}

fn int_scalar(value: i64) -> Option<ManagedTensor> {
    Some(Tensor::scalar(value).into_dlpack())
}

fn read(managed: ManagedTensor) -> (Vec<usize>, Vec<f32>) {
    let tensor = Tensor::from_dlpack(managed).unwrap();
    (tensor.shape().to_vec(), tensor.to_vec::<f32>().unwrap())
}

fn first(outputs: Vec<ManagedTensor>) -> (Vec<usize>, Vec<f32>) {
    read(outputs.into_iter().next().unwrap())
}

// =============================================================================
// Forward
// =============================================================================

#[test]
fn test_add_uses_default_alpha() {
    let out = bridge()
        .execute_operator(
            "add",
            "Tensor",
            vec![floats(&[1.0, 2.0], &[2]), floats(&[10.0, 20.0], &[2]), None],
            &[],
            None,
        )
        .unwrap();
    assert_eq!(first(out), (vec![2], vec![11.0, 22.0]));
}

#[test]
fn test_absent_default_matches_explicit_value() {
    let bridge = bridge();
    let input = [-1.0f32, -4.0, 2.0];
    let implicit = bridge
        .execute_operator("leaky_relu", "", vec![floats(&input, &[3]), None], &[], None)
        .unwrap();
    let explicit = bridge
        .execute_operator(
            "leaky_relu",
            "",
            vec![floats(&input, &[3]), Some(Tensor::scalar(0.01f64).into_dlpack())],
            &[],
            None,
        )
        .unwrap();

    let (_, a) = first(implicit);
    let (_, b) = first(explicit);
    let a_bits: Vec<u32> = a.iter().map(|v| v.to_bits()).collect();
    let b_bits: Vec<u32> = b.iter().map(|v| v.to_bits()).collect();
    assert_eq!(a_bits, b_bits);
}

#[test]
fn test_scalar_arguments_through_descriptors() {
    let out = bridge()
        .execute_operator(
            "transpose",
            "int",
            vec![
                floats(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]),
                int_scalar(0),
                Some(Tensor::from_vec(vec![-1i64], &[1]).unwrap().into_dlpack()),
            ],
            &[],
            None,
        )
        .unwrap();
    assert_eq!(first(out), (vec![3, 2], vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]));
}

#[test]
fn test_multi_element_scalar_rejected() {
    let err = bridge()
        .execute_operator(
            "transpose",
            "int",
            vec![
                floats(&[1.0, 2.0], &[1, 2]),
                Some(Tensor::from_vec(vec![0i64, 1], &[2]).unwrap().into_dlpack()),
                int_scalar(1),
            ],
            &[],
            None,
        )
        .unwrap_err();
    assert!(matches!(err, BridgeError::ArgumentShape { .. }));
    assert_eq!(err.class(), ErrorClass::SchemaMismatch);
}

#[test]
fn test_int64_keepdim_is_accepted() {
    let out = bridge()
        .execute_operator(
            "sum",
            "dim_IntList",
            vec![
                floats(&[1.0, 2.0, 3.0, 4.0], &[2, 2]),
                Some(Tensor::from_vec(vec![1i64], &[1]).unwrap().into_dlpack()),
                int_scalar(1),
                None,
            ],
            &[],
            None,
        )
        .unwrap();
    assert_eq!(first(out), (vec![2, 1], vec![3.0, 7.0]));
}

#[test]
fn test_present_scalar_alpha_is_unsupported() {
    let err = bridge()
        .execute_operator(
            "add",
            "Tensor",
            vec![floats(&[1.0], &[1]), floats(&[1.0], &[1]), int_scalar(2)],
            &[],
            None,
        )
        .unwrap_err();
    assert!(matches!(err, BridgeError::UnsupportedKind { .. }));
}

#[test]
fn test_unknown_operator() {
    let err = bridge()
        .execute_operator("conv9d", "", vec![], &[], None)
        .unwrap_err();
    assert!(matches!(err, BridgeError::UnknownOperator(_)));
    assert_eq!(err.to_string(), "Unknown operator: conv9d");
}

#[test]
fn test_multiple_outputs() {
    let out = bridge()
        .execute_operator("aminmax", "", vec![floats(&[3.0, -1.0, 7.0], &[3])], &[], None)
        .unwrap();
    assert_eq!(out.len(), 2);
    let mut out = out.into_iter();
    assert_eq!(read(out.next().unwrap()), (vec![], vec![-1.0]));
    assert_eq!(read(out.next().unwrap()), (vec![], vec![7.0]));
}

// =============================================================================
// Gradients
// =============================================================================

#[test]
fn test_add_backward() {
    let bridge = bridge();
    let mut id = -1;
    bridge
        .execute_operator(
            "add",
            "Tensor",
            vec![floats(&[1.0, 2.0], &[2]), floats(&[3.0, 4.0], &[2]), None],
            &[true, true],
            Some(&mut id),
        )
        .unwrap();

    let grads = bridge
        .execute_operator_backward(floats(&[0.5, -2.0], &[2]).unwrap(), id)
        .unwrap();
    let grads: Vec<_> = grads.into_iter().map(read).collect();
    assert_eq!(grads, vec![(vec![2], vec![0.5, -2.0]), (vec![2], vec![0.5, -2.0])]);
}

#[test]
fn test_broadcast_gradient_is_reduced() {
    let bridge = bridge();
    let mut id = -1;
    bridge
        .execute_operator(
            "mul",
            "Tensor",
            vec![floats(&[1.0, 2.0, 3.0, 4.0], &[2, 2]), floats(&[10.0], &[1])],
            &[false, true],
            Some(&mut id),
        )
        .unwrap();
    let grads = bridge
        .execute_operator_backward(floats(&[1.0, 1.0, 1.0, 1.0], &[2, 2]).unwrap(), id)
        .unwrap();
    assert_eq!(first(grads), (vec![1], vec![10.0]));
}

#[test]
fn test_shared_input_accumulates() {
    let mut table = OperatorTable::new();
    table
        .register("square(Tensor self) -> Tensor", |graph, args| {
            let x = args[0].as_tensor().unwrap();
            Ok(vec![IValue::Tensor(ops::mul(graph, x, x)?)])
        })
        .unwrap();
    let bridge = Bridge::new(Arc::new(table), BridgeConfig::default());

    let mut id = -1;
    let out = bridge
        .execute_operator("square", "", vec![floats(&[3.0, -2.0], &[2])], &[true], Some(&mut id))
        .unwrap();
    assert_eq!(first(out), (vec![2], vec![9.0, 4.0]));

    let grads = bridge
        .execute_operator_backward(floats(&[1.0, 0.5], &[2]).unwrap(), id)
        .unwrap();
    assert_eq!(first(grads), (vec![2], vec![6.0, -2.0]));
}

#[test]
fn test_internal_node_reached_by_two_paths() {
    // out = relu(a) * b + (-relu(a)): the relu node feeds both branches.
    let mut table = OperatorTable::new();
    table
        .register("gate(Tensor self, Tensor other) -> Tensor", |graph, args| {
            let a = args[0].as_tensor().unwrap();
            let b = args[1].as_tensor().unwrap();
            let r = ops::relu(graph, a)?;
            let scaled = ops::mul(graph, &r, b)?;
            let negated = ops::neg(graph, &r)?;
            Ok(vec![IValue::Tensor(ops::add(graph, &scaled, &negated, 1.0)?)])
        })
        .unwrap();
    let bridge = Bridge::new(Arc::new(table), BridgeConfig::default());

    let mut id = -1;
    let out = bridge
        .execute_operator(
            "gate",
            "",
            vec![floats(&[2.0], &[1]), floats(&[5.0], &[1])],
            &[true, true],
            Some(&mut id),
        )
        .unwrap();
    assert_eq!(first(out), (vec![1], vec![8.0]));

    let grads = bridge
        .execute_operator_backward(floats(&[1.0], &[1]).unwrap(), id)
        .unwrap();
    let grads: Vec<_> = grads.into_iter().map(read).collect();
    assert_eq!(grads, vec![(vec![1], vec![4.0]), (vec![1], vec![2.0])]);
}

#[test]
fn test_aminmax_gradient_follows_first_output() {
    let bridge = bridge();
    let mut id = -1;
    bridge
        .execute_operator(
            "aminmax",
            "",
            vec![floats(&[4.0, -1.0, 9.0, -1.0], &[4])],
            &[true],
            Some(&mut id),
        )
        .unwrap();
    let grads = bridge
        .execute_operator_backward(Tensor::scalar(2.0f32).into_dlpack(), id)
        .unwrap();
    assert_eq!(first(grads), (vec![4], vec![0.0, 2.0, 0.0, 0.0]));
}

#[test]
fn test_context_is_single_use() {
    let bridge = bridge();
    let mut id = -1;
    bridge
        .execute_operator("relu", "", vec![floats(&[1.0, -1.0], &[2])], &[true], Some(&mut id))
        .unwrap();
    bridge
        .execute_operator_backward(floats(&[1.0, 1.0], &[2]).unwrap(), id)
        .unwrap();

    let err = bridge
        .execute_operator_backward(floats(&[1.0, 1.0], &[2]).unwrap(), id)
        .unwrap_err();
    assert!(matches!(err, BridgeError::UnknownContext(i) if i == id));
    assert_eq!(err.class(), ErrorClass::Misuse);
}

#[test]
fn test_context_id_must_match_tracking() {
    let err = bridge()
        .execute_operator("relu", "", vec![floats(&[1.0], &[1])], &[true], None)
        .unwrap_err();
    assert!(matches!(err, BridgeError::ContextIdMismatch { tracking: true }));
}

#[test]
fn test_flag_on_unused_input() {
    let mut table = OperatorTable::new();
    table
        .register("lhs(Tensor self, Tensor other) -> Tensor", |graph, args| {
            let x = args[0].as_tensor().unwrap();
            Ok(vec![IValue::Tensor(ops::neg(graph, x)?)])
        })
        .unwrap();
    let bridge = Bridge::new(Arc::new(table), BridgeConfig::default());

    let mut id = -1;
    let err = bridge
        .execute_operator(
            "lhs",
            "",
            vec![floats(&[1.0], &[1]), floats(&[2.0], &[1])],
            &[true, true],
            Some(&mut id),
        )
        .unwrap_err();
    assert!(matches!(err, BridgeError::UnreachableInput { index: 1, .. }));
    assert_eq!(err.class(), ErrorClass::StructuralInconsistency);
    assert_eq!(bridge.pending_contexts(), 0);
}

#[test]
fn test_all_false_flags_have_no_root() {
    let bridge = bridge();
    let mut id = -1;
    let err = bridge
        .execute_operator(
            "mul",
            "Tensor",
            vec![floats(&[2.0], &[1]), floats(&[3.0], &[1])],
            &[false, false],
            Some(&mut id),
        )
        .unwrap_err();
    // Nothing requires grad, so the output has no producing node.
    assert!(matches!(err, BridgeError::MissingRoot { .. }));
    assert_eq!(bridge.pending_contexts(), 0);
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_callers() {
    let bridge = Arc::new(bridge());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let bridge = Arc::clone(&bridge);
            thread::spawn(move || {
                let x = i as f32;
                let mut id = -1;
                bridge
                    .execute_operator(
                        "mul",
                        "Tensor",
                        vec![floats(&[x, 1.0], &[2]), floats(&[2.0, x], &[2])],
                        &[true],
                        Some(&mut id),
                    )
                    .unwrap();
                let grads = bridge
                    .execute_operator_backward(floats(&[1.0, 1.0], &[2]).unwrap(), id)
                    .unwrap();
                (id, first(grads).1)
            })
        })
        .collect();

    let mut ids = Vec::new();
    for (i, handle) in handles.into_iter().enumerate() {
        let (id, grad) = handle.join().unwrap();
        assert_eq!(grad, vec![2.0, i as f32]);
        ids.push(id);
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(bridge.pending_contexts(), 0);
    assert_eq!(bridge.cache().len(), 1);
}
