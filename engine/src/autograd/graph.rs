// Copyright (c) 2026 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the Apache-style license found in the
// LICENSE file in the root directory of this source tree.

use super::{GradientFunction, TensorId};
use crate::{error::Result, operations::arithmetic, tensor::Tensor};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Statistics about the computation graph
#[derive(Debug, Clone)]
pub struct GraphStats {
    /// Total number of nodes in the graph
    pub total_nodes: usize,
    /// Number of leaf nodes (no inputs)
    pub leaf_nodes: usize,
    /// Number of nodes with gradient computation enabled
    pub grad_enabled_nodes: usize,
}

/// Node in the computation graph
pub struct GraphNode {
    /// Tensor ID
    pub tensor_id: TensorId,
    /// Gradient function for the backward pass
    pub grad_fn: Option<Arc<dyn GradientFunction>>,
    /// Input tensor IDs
    pub inputs: Vec<TensorId>,
    /// Whether this node requires gradients
    pub requires_grad: bool,
    /// Whether backward() has been invoked on this node directly.
    /// Diagnostic only; re-invocation is allowed.
    pub called_backward: bool,
}

impl GraphNode {
    /// Create a new graph node
    pub fn new(
        tensor_id: TensorId,
        grad_fn: Option<Arc<dyn GradientFunction>>,
        requires_grad: bool,
    ) -> Self {
        let inputs = grad_fn
            .as_ref()
            .map(|f| f.input_ids().to_vec())
            .unwrap_or_default();

        Self {
            tensor_id,
            grad_fn,
            inputs,
            requires_grad,
            called_backward: false,
        }
    }

    /// Check if this is a leaf node (no inputs)
    #[inline(always)]
    pub fn is_leaf(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Get the operation name from the gradient function
    pub fn operation_name(&self) -> &str {
        self.grad_fn.as_ref().map(|f| f.name()).unwrap_or("leaf")
    }
}

/// Computation graph for automatic differentiation.
///
/// The graph keeps a reverse topological ordering of its nodes so that a
/// backward pass evaluates each gradient function exactly once, after every
/// consumer of its output has contributed its partial gradient. Gradients
/// accumulated by successive backward passes persist in the graph's store
/// until cleared.
pub struct ComputationGraph {
    /// Nodes in the graph
    nodes: FxHashMap<TensorId, GraphNode>,
    /// Topological ordering for the backward pass (outputs first)
    topological_order: Vec<TensorId>,
    /// Accumulated gradients, persisted across backward passes
    gradients: FxHashMap<TensorId, Tensor>,
}

impl ComputationGraph {
    /// Create a new empty computation graph
    pub fn new() -> Self {
        Self {
            nodes: FxHashMap::default(),
            topological_order: Vec::new(),
            gradients: FxHashMap::default(),
        }
    }

    /// Add a tensor to the computation graph
    pub fn add_tensor_with_grad_req(
        &mut self,
        tensor_id: TensorId,
        grad_fn: Option<Arc<dyn GradientFunction>>,
        requires_grad: bool,
    ) {
        let node = GraphNode::new(tensor_id, grad_fn, requires_grad);
        self.nodes.insert(tensor_id, node);
        self.update_topological_order();
    }

    /// Update the topological ordering of nodes using Kahn's algorithm.
    /// Producers sort before consumers; the order is then reversed so the
    /// backward pass visits outputs first.
    fn update_topological_order(&mut self) {
        self.topological_order.clear();

        let mut consumers: FxHashMap<TensorId, Vec<TensorId>> = FxHashMap::default();
        let mut in_degree: FxHashMap<TensorId, usize> = FxHashMap::default();

        for &node_id in self.nodes.keys() {
            consumers.entry(node_id).or_default();
            in_degree.entry(node_id).or_insert(0);
        }

        // Inputs that were never registered as nodes (leaf tensors) still
        // participate in the ordering as implicit producers.
        for node in self.nodes.values() {
            for &input_id in &node.inputs {
                consumers.entry(input_id).or_default().push(node.tensor_id);
                in_degree.entry(input_id).or_insert(0);
                *in_degree.entry(node.tensor_id).or_insert(0) += 1;
            }
        }

        let mut queue: Vec<TensorId> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&id, _)| id)
            .collect();

        while let Some(current_id) = queue.pop() {
            self.topological_order.push(current_id);

            if let Some(deps) = consumers.get(&current_id) {
                for &consumer_id in deps {
                    if let Some(degree) = in_degree.get_mut(&consumer_id) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push(consumer_id);
                        }
                    }
                }
            }
        }

        // Reverse so outputs come first for the backward sweep
        self.topological_order.reverse();
    }

    /// Perform a backward pass from `root` with the given seed gradient.
    ///
    /// Flow gradients for this pass accumulate in a per-pass map, so a node
    /// reached through several paths receives the chain-rule sum before its
    /// own gradient function runs. At the end of the pass the flow gradients
    /// are folded into the persistent store.
    pub fn backward(
        &mut self,
        root: TensorId,
        seed: Tensor,
    ) -> Result<FxHashMap<TensorId, Tensor>> {
        let mut flow: FxHashMap<TensorId, Tensor> = FxHashMap::default();
        flow.insert(root, seed);

        for &node_id in &self.topological_order {
            let Some(node) = self.nodes.get(&node_id) else {
                continue;
            };
            if !node.requires_grad {
                continue;
            }
            let Some(grad_output) = flow.get(&node_id).cloned() else {
                continue;
            };
            let Some(grad_fn) = &node.grad_fn else {
                continue;
            };

            let input_grads = grad_fn.backward(&grad_output)?;
            for (input_id, grad) in input_grads {
                match flow.get_mut(&input_id) {
                    Some(existing) => {
                        *existing = arithmetic::add(existing, &grad)?;
                    }
                    None => {
                        flow.insert(input_id, grad);
                    }
                }
            }
        }

        for (id, grad) in &flow {
            match self.gradients.get_mut(id) {
                Some(existing) => {
                    *existing = arithmetic::add(existing, grad)?;
                }
                None => {
                    self.gradients.insert(*id, grad.clone());
                }
            }
        }

        Ok(flow)
    }

    /// Get the stored gradient for a tensor
    #[inline(always)]
    pub fn get_gradient(&self, tensor_id: TensorId) -> Option<&Tensor> {
        self.gradients.get(&tensor_id)
    }

    /// Replace the stored gradient for a tensor
    #[inline(always)]
    pub fn set_gradient(&mut self, tensor_id: TensorId, grad: Tensor) {
        self.gradients.insert(tensor_id, grad);
    }

    /// Clear all stored gradients
    pub fn zero_grad(&mut self) {
        self.gradients.clear();
    }

    /// Whether backward() was already invoked on this node directly
    pub fn backward_was_called(&self, tensor_id: TensorId) -> bool {
        self.nodes
            .get(&tensor_id)
            .map(|n| n.called_backward)
            .unwrap_or(false)
    }

    /// Record that backward() was invoked on this node directly. Leaf
    /// tensors that were never registered get a node so the flag sticks.
    pub fn mark_backward_called(&mut self, tensor_id: TensorId) {
        if !self.nodes.contains_key(&tensor_id) {
            self.add_tensor_with_grad_req(tensor_id, None, true);
        }
        if let Some(node) = self.nodes.get_mut(&tensor_id) {
            node.called_backward = true;
        }
    }

    /// Get the number of nodes in the graph
    #[inline(always)]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Check if a tensor is in the graph
    #[inline(always)]
    pub fn contains_tensor(&self, tensor_id: TensorId) -> bool {
        self.nodes.contains_key(&tensor_id)
    }

    /// Get the topological order of tensor IDs (outputs first)
    #[inline(always)]
    pub fn topological_order(&self) -> &[TensorId] {
        &self.topological_order
    }

    /// Get a node by tensor ID
    #[inline(always)]
    pub fn get_node(&self, tensor_id: TensorId) -> Option<&GraphNode> {
        self.nodes.get(&tensor_id)
    }

    /// Get statistics about the computation graph
    pub fn stats(&self) -> GraphStats {
        let leaf_nodes = self.nodes.values().filter(|node| node.is_leaf()).count();
        let grad_enabled_nodes = self
            .nodes
            .values()
            .filter(|node| node.requires_grad)
            .count();

        GraphStats {
            total_nodes: self.nodes.len(),
            leaf_nodes,
            grad_enabled_nodes,
        }
    }
}

impl Default for ComputationGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::functions::AddBackward;
    use crate::device::Device;
    use crate::tensor::{DataType, Shape};

    #[test]
    fn test_empty_graph() {
        let graph = ComputationGraph::new();
        assert_eq!(graph.num_nodes(), 0);
        assert!(graph.topological_order().is_empty());
    }

    #[test]
    fn test_add_leaf_node() {
        let mut graph = ComputationGraph::new();
        let id = TensorId::new();
        graph.add_tensor_with_grad_req(id, None, true);

        assert_eq!(graph.num_nodes(), 1);
        assert!(graph.contains_tensor(id));
        let node = graph.get_node(id).unwrap();
        assert!(node.is_leaf());
        assert_eq!(node.operation_name(), "leaf");
    }

    #[test]
    fn test_topological_order_outputs_first() {
        let mut graph = ComputationGraph::new();
        let a = TensorId::new();
        let b = TensorId::new();
        let c = TensorId::new();

        graph.add_tensor_with_grad_req(a, None, true);
        graph.add_tensor_with_grad_req(b, None, true);
        let add_fn = Arc::new(AddBackward {
            input_shapes: [vec![2], vec![2]],
            input_ids: [a, b],
        });
        graph.add_tensor_with_grad_req(c, Some(add_fn), true);

        let order = graph.topological_order();
        assert_eq!(order.len(), 3);
        let pos = |id| order.iter().position(|&x| x == id).unwrap();
        assert!(pos(c) < pos(a));
        assert!(pos(c) < pos(b));
    }

    #[test]
    fn test_backward_pass_simple_add() {
        let mut graph = ComputationGraph::new();
        let a = TensorId::new();
        let b = TensorId::new();
        let c = TensorId::new();

        graph.add_tensor_with_grad_req(a, None, true);
        graph.add_tensor_with_grad_req(b, None, true);
        let add_fn = Arc::new(AddBackward {
            input_shapes: [vec![2], vec![2]],
            input_ids: [a, b],
        });
        graph.add_tensor_with_grad_req(c, Some(add_fn), true);

        let seed = Tensor::ones(
            Shape::new(vec![2]),
            DataType::Float32,
            Device::cpu(),
            false,
        );
        let grads = graph.backward(c, seed).unwrap();

        assert!(grads.contains_key(&a));
        assert!(grads.contains_key(&b));
        assert_eq!(grads.len(), 3);
        assert_eq!(
            grads.get(&a).unwrap().data().as_f32_slice().unwrap(),
            &[1.0, 1.0]
        );
    }

    #[test]
    fn test_gradient_store_accumulates_across_passes() {
        let mut graph = ComputationGraph::new();
        let a = TensorId::new();
        let b = TensorId::new();
        let c = TensorId::new();

        graph.add_tensor_with_grad_req(a, None, true);
        graph.add_tensor_with_grad_req(b, None, true);
        let add_fn = Arc::new(AddBackward {
            input_shapes: [vec![1], vec![1]],
            input_ids: [a, b],
        });
        graph.add_tensor_with_grad_req(c, Some(add_fn), true);

        let seed = || Tensor::ones(Shape::new(vec![1]), DataType::Float32, Device::cpu(), false);
        graph.backward(c, seed()).unwrap();
        graph.backward(c, seed()).unwrap();

        let grad_a = graph.get_gradient(a).unwrap();
        assert_eq!(grad_a.data().as_f32_slice().unwrap(), &[2.0]);
    }

    #[test]
    fn test_zero_grad_clears_store() {
        let mut graph = ComputationGraph::new();
        let a = TensorId::new();
        graph.add_tensor_with_grad_req(a, None, true);
        let seed = Tensor::ones(Shape::new(vec![1]), DataType::Float32, Device::cpu(), false);
        graph.backward(a, seed).unwrap();
        assert!(graph.get_gradient(a).is_some());

        graph.zero_grad();
        assert!(graph.get_gradient(a).is_none());
    }

    #[test]
    fn test_called_backward_flag() {
        let mut graph = ComputationGraph::new();
        let a = TensorId::new();
        graph.add_tensor_with_grad_req(a, None, true);

        assert!(!graph.backward_was_called(a));
        graph.mark_backward_called(a);
        assert!(graph.backward_was_called(a));
    }

    #[test]
    fn test_graph_stats() {
        let mut graph = ComputationGraph::new();
        let a = TensorId::new();
        let b = TensorId::new();
        let c = TensorId::new();
        graph.add_tensor_with_grad_req(a, None, true);
        graph.add_tensor_with_grad_req(b, None, false);
        let add_fn = Arc::new(AddBackward {
            input_shapes: [vec![1], vec![1]],
            input_ids: [a, b],
        });
        graph.add_tensor_with_grad_req(c, Some(add_fn), true);

        let stats = graph.stats();
        assert_eq!(stats.total_nodes, 3);
        assert_eq!(stats.leaf_nodes, 2);
        assert_eq!(stats.grad_enabled_nodes, 2);
    }
}
