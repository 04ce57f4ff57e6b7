// Copyright (c) 2026 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the Apache-style license found in the
// LICENSE file in the root directory of this source tree.

pub mod export;
pub mod functions;
pub mod graph;

pub use graph::{ComputationGraph, GraphNode, GraphStats};

use crate::{
    error::{Result, TensorgradError},
    tensor::Tensor,
};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Unique identifier for tensors in the computation graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorId(usize);

impl TensorId {
    /// Create a new unique tensor ID
    pub fn new() -> Self {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    #[inline(always)]
    pub fn raw(&self) -> usize {
        self.0
    }
}

impl Default for TensorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TensorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TensorId({})", self.0)
    }
}

/// Trait for gradient functions in the computation graph.
///
/// One implementation exists per differentiable operator kind; an instance
/// is created at the moment the forward op runs, holding whatever forward
/// state the local derivative needs. `backward` is pure and may run multiple
/// times across the tensor's lifetime.
pub trait GradientFunction: Send + Sync {
    /// Compute gradients for inputs given the output gradient.
    ///
    /// When the same tensor feeds the operation more than once, its partial
    /// gradients are accumulated into a single map entry.
    fn backward(&self, grad_output: &Tensor) -> Result<FxHashMap<TensorId, Tensor>>;

    /// Get the input tensor IDs that this function depends on
    fn input_ids(&self) -> &[TensorId];

    /// Name of the gradient function used for debugging and introspection
    fn name(&self) -> &'static str {
        let full = std::any::type_name::<Self>();
        match full.rsplit("::").next() {
            Some(name) => name,
            None => full,
        }
    }
}

// Thread-local computation graph: graph construction and backward traversal
// are driven by a single logical thread.
thread_local! {
    static GLOBAL_GRAPH: RefCell<ComputationGraph> = RefCell::new(ComputationGraph::new());
}

/// Add a tensor and its gradient function to the computation graph
pub fn add_to_graph(tensor: &Tensor, grad_fn: Option<Arc<dyn GradientFunction>>) -> Result<()> {
    GLOBAL_GRAPH.with(|graph| {
        graph
            .borrow_mut()
            .add_tensor_with_grad_req(tensor.id(), grad_fn, tensor.requires_grad());
    });
    Ok(())
}

/// Perform a backward pass from the given tensor.
///
/// An explicit `grad_output` is honored as the seed when supplied; otherwise
/// the pass is seeded with ones of the tensor's shape. Returns the gradients
/// computed by this pass, keyed by tensor ID.
pub fn backward(
    tensor: &Tensor,
    grad_output: Option<Tensor>,
) -> Result<FxHashMap<TensorId, Tensor>> {
    if !tensor.requires_grad() {
        return Err(TensorgradError::gradient_error(
            "backward() called on a tensor that does not require grad",
        ));
    }

    let seed = match grad_output {
        Some(grad) => {
            if grad.shape() != tensor.shape() {
                return Err(TensorgradError::shape_mismatch(
                    tensor.shape().dims().to_vec(),
                    grad.shape().dims().to_vec(),
                ));
            }
            if grad.dtype() != tensor.dtype() {
                return Err(TensorgradError::type_mismatch(
                    tensor.dtype().to_string(),
                    grad.dtype().to_string(),
                ));
            }
            grad.detach()
        }
        None => Tensor::ones(
            tensor.shape().clone(),
            tensor.dtype(),
            tensor.device(),
            false,
        ),
    };

    GLOBAL_GRAPH.with(|graph| {
        let mut graph = graph.borrow_mut();
        if graph.backward_was_called(tensor.id()) {
            log::debug!(
                "backward() called again on tensor {}; re-seeding and re-propagating",
                tensor.id()
            );
        }
        graph.mark_backward_called(tensor.id());
        graph.backward(tensor.id(), seed)
    })
}

/// Get the accumulated gradient for a tensor
pub fn get_gradient(tensor: &Tensor) -> Option<Tensor> {
    GLOBAL_GRAPH.with(|graph| graph.borrow().get_gradient(tensor.id()).cloned())
}

/// Replace the stored gradient for a tensor
pub fn set_gradient(tensor: &Tensor, grad: Tensor) {
    GLOBAL_GRAPH.with(|graph| graph.borrow_mut().set_gradient(tensor.id(), grad));
}

/// Clear all stored gradients
pub fn zero_gradients() {
    GLOBAL_GRAPH.with(|graph| graph.borrow_mut().zero_grad());
}

/// Reset the computation graph, dropping nodes and gradients
pub fn clear_graph() -> Result<()> {
    GLOBAL_GRAPH.with(|graph| {
        *graph.borrow_mut() = ComputationGraph::new();
    });
    Ok(())
}

/// Run a closure against the thread's computation graph
pub(crate) fn with_graph<R>(f: impl FnOnce(&ComputationGraph) -> R) -> R {
    GLOBAL_GRAPH.with(|graph| f(&graph.borrow()))
}

/// Statistics about the thread's computation graph
pub fn graph_stats() -> GraphStats {
    with_graph(|graph| graph.stats())
}
