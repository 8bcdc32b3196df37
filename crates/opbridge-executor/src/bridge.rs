//! Bridge - Operator Bridge Facade
//!
//! Ties the descriptor cache, argument marshaling, forward capture, the
//! context store and backward replay together behind three calls:
//! `is_tensor_argument`, `execute_operator` and `execute_operator_backward`.
//! A `Bridge` is `Send + Sync` and meant to be shared across threads.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use std::sync::Arc;

use opbridge_core::{ManagedTensor, Tensor};
use tracing::{debug, trace};

use crate::backward::run_backward;
use crate::cache::OperatorCache;
use crate::config::BridgeConfig;
use crate::context::ContextStore;
use crate::error::{BridgeError, BridgeResult};
use crate::forward::run_forward;
use crate::library::builtin_library;
use crate::marshal::{marshal_arguments, MarshalOptions};
use crate::registry::OperatorRegistry;

// =============================================================================
// Bridge
// =============================================================================

/// Entry point for callers exchanging DLPack tensors.
#[derive(Debug)]
pub struct Bridge {
    cache: OperatorCache,
    store: ContextStore,
    config: BridgeConfig,
}

impl Bridge {
    /// Creates a bridge over `registry`.
    pub fn new(registry: Arc<dyn OperatorRegistry>, config: BridgeConfig) -> Self {
        Self {
            cache: OperatorCache::new(registry),
            store: ContextStore::new(config.max_pending_contexts),
            config,
        }
    }

    /// Creates a bridge over the built-in operator library.
    pub fn with_builtin_library(config: BridgeConfig) -> BridgeResult<Self> {
        Ok(Self::new(Arc::new(builtin_library()?), config))
    }

    /// Active configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Descriptor cache.
    pub fn cache(&self) -> &OperatorCache {
        &self.cache
    }

    /// Number of contexts waiting for a backward call.
    pub fn pending_contexts(&self) -> usize {
        self.store.len()
    }

    /// Whether argument `index` of `op.overload` is a tensor.
    pub fn is_tensor_argument(&self, op: &str, overload: &str, index: usize) -> BridgeResult<bool> {
        self.cache.resolve(op, overload)?.is_tensor_argument(index)
    }

    /// Runs `op.overload` on positional descriptors, `None` marking an absent
    /// argument.
    ///
    /// With non-empty `gradient_flags` the call is tracked: `context_id` must
    /// then be `Some` and receives the id to pass to
    /// [`execute_operator_backward`](Self::execute_operator_backward). With
    /// empty flags `context_id` must be `None`.
    pub fn execute_operator(
        &self,
        op: &str,
        overload: &str,
        arguments: Vec<Option<ManagedTensor>>,
        gradient_flags: &[bool],
        context_id: Option<&mut i64>,
    ) -> BridgeResult<Vec<ManagedTensor>> {
        let tracking = !gradient_flags.is_empty();
        if tracking != context_id.is_some() {
            return Err(BridgeError::ContextIdMismatch { tracking });
        }

        let descriptor = self.cache.resolve(op, overload)?;
        trace!(
            operator = %descriptor.name(),
            arguments = arguments.len(),
            tracking,
            "executing operator"
        );
        let values = marshal_arguments(&descriptor, arguments, MarshalOptions::from(&self.config))?;
        let output = run_forward(&descriptor, values, gradient_flags, &self.store)?;

        if let (Some(slot), Some(id)) = (context_id, output.context_id) {
            *slot = id;
        }
        Ok(output.outputs.into_iter().map(Tensor::into_dlpack).collect())
    }

    /// Replays the graph stored under `context_id` with `grad_output` and
    /// returns one gradient per flagged input, in flag order.
    ///
    /// The context is consumed even if replay fails.
    pub fn execute_operator_backward(
        &self,
        grad_output: ManagedTensor,
        context_id: i64,
    ) -> BridgeResult<Vec<ManagedTensor>> {
        let context = self.store.pop(context_id)?;
        let grad_output = Tensor::from_dlpack(grad_output)?;
        let grads = run_backward(&context, grad_output)?;
        debug!(context_id, gradients = grads.len(), "backward complete");
        Ok(grads.into_iter().map(Tensor::into_dlpack).collect())
    }
}

// =============================================================================
// Tests
// =============================================================================
