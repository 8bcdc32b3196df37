//! OpBridge C API - Foreign Entry Points
//!
//! Exposes the operator bridge to a host runtime over a C ABI. The host calls
//! `opbridge_init` once, then dispatches operators with DLPack descriptors.
//! The host may also fetch raw entry-point addresses through the
//! `*_address` getters and call them directly.
//!
//! Ownership follows DLPack: every descriptor handed to an entry point is
//! consumed (its deleter runs when the bridge is done with it), and every
//! descriptor written to an output array belongs to the host.
//!
//! Every failure is fatal. An error or panic inside an entry point is logged
//! with `tracing::error!` and the process aborts.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::ffi::CStr;
use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use libc::{c_char, size_t};
use opbridge_core::{DLManagedTensor, ManagedTensor};
use opbridge_executor::{Bridge, BridgeConfig, BridgeError, BridgeResult};
use parking_lot::RwLock;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

// =============================================================================
// Global Bridge
// =============================================================================

static BRIDGE: RwLock<Option<Arc<Bridge>>> = parking_lot::const_rwlock(None);

/// Installs `bridge` as the one the entry points dispatch to, replacing any
/// previous one.
pub fn install(bridge: Arc<Bridge>) {
    *BRIDGE.write() = Some(bridge);
}

/// Removes the installed bridge, returning it.
pub fn uninstall() -> Option<Arc<Bridge>> {
    BRIDGE.write().take()
}

fn current() -> BridgeResult<Arc<Bridge>> {
    BRIDGE.read().clone().ok_or(BridgeError::NotInitialized)
}

// =============================================================================
// Fatal Errors
// =============================================================================

fn fatal(entry: &str, message: impl Display) -> ! {
    error!(entry, "{message}");
    std::process::abort()
}

/// Runs `f`, aborting on error or panic.
fn guarded<T>(entry: &str, f: impl FnOnce() -> BridgeResult<T>) -> T {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => fatal(entry, e),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            fatal(entry, format_args!("panic: {message}"))
        }
    }
}

fn string_arg<'a>(entry: &str, name: &str, ptr: *const c_char) -> &'a str {
    if ptr.is_null() {
        fatal(entry, format_args!("{name} is null"));
    }
    match unsafe { CStr::from_ptr(ptr) }.to_str() {
        Ok(s) => s,
        Err(e) => fatal(entry, format_args!("{name} is not UTF-8: {e}")),
    }
}

fn write_outputs(
    entry: &str,
    tensors: Vec<ManagedTensor>,
    outputs: *mut *mut DLManagedTensor,
    capacity: size_t,
) -> size_t {
    let count = tensors.len();
    if count > capacity {
        fatal(
            entry,
            format_args!("{count} outputs do not fit an array of {capacity}"),
        );
    }
    if count > 0 && outputs.is_null() {
        fatal(entry, "output array is null");
    }
    for (i, tensor) in tensors.into_iter().enumerate() {
        unsafe { *outputs.add(i) = tensor.into_raw() };
    }
    count
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Builds a bridge over the reference operator library and installs logging.
///
/// `config_path` names a TOML configuration file; when null, the file named
/// by `OPBRIDGE_CONFIG` is used, or the defaults if that is unset. Logging
/// honours `RUST_LOG`, falling back to the configured `log_filter`.
#[no_mangle]
pub extern "C" fn opbridge_init(config_path: *const c_char) {
    const ENTRY: &str = "opbridge_init";
    let config = guarded(ENTRY, || {
        if config_path.is_null() {
            BridgeConfig::from_env()
        } else {
            BridgeConfig::load(string_arg(ENTRY, "config_path", config_path))
        }
    });

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    // A host that already installed a subscriber keeps it.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let bridge = guarded(ENTRY, || Bridge::with_builtin_library(config));
    install(Arc::new(bridge));
    debug!("operator bridge initialized");
}

/// Drops the installed bridge and every pending autograd context.
#[no_mangle]
pub extern "C" fn opbridge_shutdown() {
    if let Some(bridge) = uninstall() {
        debug!(pending = bridge.pending_contexts(), "operator bridge shut down");
    }
}

// =============================================================================
// Entry Points
// =============================================================================

/// Returns whether argument `index` of `op_name.overload_name` is a tensor.
#[no_mangle]
pub extern "C" fn opbridge_is_tensor_argument(
    op_name: *const c_char,
    overload_name: *const c_char,
    index: size_t,
) -> bool {
    const ENTRY: &str = "opbridge_is_tensor_argument";
    guarded(ENTRY, || {
        let op = string_arg(ENTRY, "op_name", op_name);
        let overload = string_arg(ENTRY, "overload_name", overload_name);
        current()?.is_tensor_argument(op, overload, index)
    })
}

/// Runs `op_name.overload_name`.
///
/// # Arguments
/// * `arguments` - One descriptor per schema argument; null marks an absent one
/// * `gradient_flags` - Per-argument flags; tracking is on iff `num_flags > 0`
/// * `context_id` - Receives the context id; must be non-null iff tracking
/// * `outputs` - Array receiving the output descriptors
///
/// # Returns
/// Number of outputs written.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub extern "C" fn opbridge_execute_operator(
    op_name: *const c_char,
    overload_name: *const c_char,
    arguments: *const *mut DLManagedTensor,
    num_arguments: size_t,
    gradient_flags: *const bool,
    num_flags: size_t,
    context_id: *mut i64,
    outputs: *mut *mut DLManagedTensor,
    output_capacity: size_t,
) -> size_t {
    const ENTRY: &str = "opbridge_execute_operator";
    let tensors = guarded(ENTRY, || {
        let op = string_arg(ENTRY, "op_name", op_name);
        let overload = string_arg(ENTRY, "overload_name", overload_name);

        if num_arguments > 0 && arguments.is_null() {
            fatal(ENTRY, "argument array is null");
        }
        let managed: Vec<Option<ManagedTensor>> = (0..num_arguments)
            .map(|i| unsafe { ManagedTensor::from_raw(*arguments.add(i)) })
            .collect();

        let flags: &[bool] = if num_flags == 0 {
            &[]
        } else if gradient_flags.is_null() {
            fatal(ENTRY, "gradient flag array is null")
        } else {
            unsafe { std::slice::from_raw_parts(gradient_flags, num_flags) }
        };
        let context_id = unsafe { context_id.as_mut() };

        current()?.execute_operator(op, overload, managed, flags, context_id)
    });
    write_outputs(ENTRY, tensors, outputs, output_capacity)
}

/// Replays context `context_id` with `grad_output`.
///
/// # Returns
/// Number of gradients written to `outputs`, one per flagged input.
#[no_mangle]
pub extern "C" fn opbridge_execute_operator_backward(
    grad_output: *mut DLManagedTensor,
    context_id: i64,
    outputs: *mut *mut DLManagedTensor,
    output_capacity: size_t,
) -> size_t {
    const ENTRY: &str = "opbridge_execute_operator_backward";
    let tensors = guarded(ENTRY, || {
        let Some(grad) = (unsafe { ManagedTensor::from_raw(grad_output) }) else {
            fatal(ENTRY, "grad_output is null")
        };
        current()?.execute_operator_backward(grad, context_id)
    });
    write_outputs(ENTRY, tensors, outputs, output_capacity)
}

/// Runs the deleter of a descriptor. Null is ignored.
#[no_mangle]
pub extern "C" fn opbridge_release_tensor(tensor: *mut DLManagedTensor) {
    drop(unsafe { ManagedTensor::from_raw(tensor) });
}

// =============================================================================
// Entry-point Addresses
// =============================================================================

/// Address of [`opbridge_is_tensor_argument`].
#[no_mangle]
pub extern "C" fn opbridge_is_tensor_argument_address() -> size_t {
    opbridge_is_tensor_argument as size_t
}

/// Address of [`opbridge_execute_operator`].
#[no_mangle]
pub extern "C" fn opbridge_execute_operator_address() -> size_t {
    opbridge_execute_operator as size_t
}

/// Address of [`opbridge_execute_operator_backward`].
#[no_mangle]
pub extern "C" fn opbridge_execute_operator_backward_address() -> size_t {
    opbridge_execute_operator_backward as size_t
}

// =============================================================================
// Tests
// =============================================================================
