// Copyright (c) 2026 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the Apache-style license found in the
// LICENSE file in the root directory of this source tree.

use crate::{autograd, tensor::Tensor};
use rustc_hash::FxHashSet;

/// Render the computation graph reachable from `output` in Graphviz DOT
/// format: one node per backward function, edges pointing from each input to
/// the node that consumes it. Leaf tensors render as plain boxes.
pub fn to_dot(output: &Tensor) -> String {
    let mut dot = String::from("digraph ComputationGraph {\n");
    dot.push_str("  rankdir=BT;\n");
    dot.push_str("  node [shape=box, fontsize=10];\n");

    autograd::with_graph(|graph| {
        let mut visited = FxHashSet::default();
        let mut stack = vec![output.id()];

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }

            match graph.get_node(id) {
                Some(node) => {
                    dot.push_str(&format!(
                        "  t{} [label=\"{}\"];\n",
                        id.raw(),
                        node.operation_name()
                    ));
                    for &input_id in &node.inputs {
                        dot.push_str(&format!("  t{} -> t{};\n", input_id.raw(), id.raw()));
                        stack.push(input_id);
                    }
                }
                None => {
                    dot.push_str(&format!("  t{} [label=\"leaf\"];\n", id.raw()));
                }
            }
        }
    });

    dot.push_str("}\n");
    dot
}
