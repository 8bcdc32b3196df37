//! C API Tests - Entry points driven through raw descriptors
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use std::ffi::CString;
use std::ptr;
use std::sync::{Arc, Once};

use opbridge_capi::{
    install, opbridge_execute_operator, opbridge_execute_operator_address,
    opbridge_execute_operator_backward, opbridge_is_tensor_argument, opbridge_release_tensor,
};
use opbridge_core::{DLManagedTensor, ManagedTensor, Tensor};
use opbridge_executor::{Bridge, BridgeConfig};

// =============================================================================
// Helpers
// =============================================================================

static SETUP: Once = Once::new();

fn setup() {
    SETUP.call_once(|| {
        install(Arc::new(
            Bridge::with_builtin_library(BridgeConfig::default()).unwrap(),
        ));
    });
}

fn raw(data: &[f32], shape: &[usize]) -> *mut DLManagedTensor {
    Tensor::from_vec(data.to_vec(), shape)
        .unwrap()
        .into_dlpack()
        .into_raw()
}

fn take(raw: *mut DLManagedTensor) -> Vec<f32> {
    let managed = unsafe { ManagedTensor::from_raw(raw) }.unwrap();
    Tensor::from_dlpack(managed).unwrap().to_vec::<f32>().unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_is_tensor_argument() {
    setup();
    let op = CString::new("add").unwrap();
    let overload = CString::new("Tensor").unwrap();
    assert!(opbridge_is_tensor_argument(op.as_ptr(), overload.as_ptr(), 1));
    assert!(!opbridge_is_tensor_argument(op.as_ptr(), overload.as_ptr(), 2));
}

#[test]
fn test_execute_with_absent_argument() {
    setup();
    let op = CString::new("add").unwrap();
    let overload = CString::new("Tensor").unwrap();
    let args = [raw(&[1.0, 2.0], &[2]), raw(&[3.0, 4.0], &[2]), ptr::null_mut()];
    let mut outputs = [ptr::null_mut(); 2];

    let count = opbridge_execute_operator(
        op.as_ptr(),
        overload.as_ptr(),
        args.as_ptr(),
        args.len(),
        ptr::null(),
        0,
        ptr::null_mut(),
        outputs.as_mut_ptr(),
        outputs.len(),
    );
    assert_eq!(count, 1);
    assert_eq!(take(outputs[0]), vec![4.0, 6.0]);
    assert!(outputs[1].is_null());
}

#[test]
fn test_forward_and_backward() {
    setup();
    let op = CString::new("mul").unwrap();
    let overload = CString::new("Tensor").unwrap();
    let args = [raw(&[2.0, 3.0], &[2]), raw(&[5.0, 7.0], &[2])];
    let flags = [true, true];
    let mut context_id = -1i64;
    let mut outputs = [ptr::null_mut(); 1];

    let count = opbridge_execute_operator(
        op.as_ptr(),
        overload.as_ptr(),
        args.as_ptr(),
        args.len(),
        flags.as_ptr(),
        flags.len(),
        &mut context_id,
        outputs.as_mut_ptr(),
        outputs.len(),
    );
    assert_eq!(count, 1);
    assert!(context_id >= 0);
    assert_eq!(take(outputs[0]), vec![10.0, 21.0]);

    let mut grads = [ptr::null_mut(); 2];
    let count = opbridge_execute_operator_backward(
        raw(&[1.0, 1.0], &[2]),
        context_id,
        grads.as_mut_ptr(),
        grads.len(),
    );
    assert_eq!(count, 2);
    assert_eq!(take(grads[0]), vec![5.0, 7.0]);
    assert_eq!(take(grads[1]), vec![2.0, 3.0]);
}

#[test]
fn test_entry_point_address() {
    setup();
    type Execute = extern "C" fn(
        *const libc::c_char,
        *const libc::c_char,
        *const *mut DLManagedTensor,
        usize,
        *const bool,
        usize,
        *mut i64,
        *mut *mut DLManagedTensor,
        usize,
    ) -> usize;

    let address = opbridge_execute_operator_address();
    assert_ne!(address, 0);
    let execute: Execute = unsafe { std::mem::transmute::<usize, Execute>(address) };

    let op = CString::new("neg").unwrap();
    let overload = CString::new("").unwrap();
    let args = [raw(&[1.5], &[1])];
    let mut outputs = [ptr::null_mut(); 1];
    let count = execute(
        op.as_ptr(),
        overload.as_ptr(),
        args.as_ptr(),
        1,
        ptr::null(),
        0,
        ptr::null_mut(),
        outputs.as_mut_ptr(),
        1,
    );
    assert_eq!(count, 1);
    assert_eq!(take(outputs[0]), vec![-1.5]);
}

#[test]
fn test_release_tensor() {
    opbridge_release_tensor(raw(&[1.0], &[1]));
    opbridge_release_tensor(ptr::null_mut());
}
