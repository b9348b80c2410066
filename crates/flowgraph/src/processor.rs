// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph processor: orders nodes topologically and runs one evaluation
//! pass, moving values along edges between the per-node callbacks.

use crate::graph::{Graph, GraphEvent};
use crate::node::NodeId;
use crate::propagation;
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::VecDeque;

/// Error when graph contains a cycle
#[derive(Debug, thiserror::Error)]
#[error("graph contains a cycle")]
pub struct CycleError;

/// Executes a graph: a topological order computed once, replayable over the
/// same graph until its structure changes.
#[derive(Debug, Clone)]
pub struct Processor {
    order: Vec<NodeId>,
}

impl Processor {
    /// Order the graph's nodes so that every producer runs before its
    /// consumers (Kahn's algorithm; ties resolve in node insertion order)
    /// and stamp each node's `compute_order`.
    pub fn new(graph: &mut Graph) -> Result<Self, CycleError> {
        let mut indegree: IndexMap<NodeId, usize> =
            graph.node_ids().map(|id| (id, 0)).collect();
        for edge in graph.edges() {
            if let Some(count) = indegree.get_mut(&edge.input_node) {
                *count += 1;
            }
        }

        let mut ready: VecDeque<NodeId> = indegree
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(indegree.len());
        while let Some(node_id) = ready.pop_front() {
            order.push(node_id);
            let consumers: Vec<NodeId> = graph
                .edges_for_node(node_id)
                .filter(|e| e.output_node == node_id)
                .map(|e| e.input_node)
                .collect();
            for consumer in consumers {
                if let Some(count) = indegree.get_mut(&consumer) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(consumer);
                    }
                }
            }
        }

        if order.len() != indegree.len() {
            return Err(CycleError);
        }
        for (index, node_id) in order.iter().enumerate() {
            if let Some(node) = graph.node_mut(*node_id) {
                node.compute_order = index as i32;
            }
        }
        Ok(Self { order })
    }

    /// The computed execution order.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// Run one evaluation pass over the graph.
    pub fn run(&self, graph: &mut Graph) {
        self.run_with_ingress(graph, IndexMap::new());
    }

    /// Run one evaluation pass, seeding the graph's ingress boundary with
    /// the given values (used when the graph is a subgraph body).
    ///
    /// Per node: pre-process, pull inputs, process, push outputs,
    /// post-process. Callback failures are logged and recorded on the node;
    /// the pass always runs to completion.
    pub fn run_with_ingress(&self, graph: &mut Graph, ingress: IndexMap<String, Value>) {
        graph.boundary_buffers.ingress = ingress;
        for &node_id in &self.order {
            tracing::trace!("processing node {:?}", node_id);
            graph.scoped_call(node_id, "pre-process", |b, scope| b.pre_process(scope));
            propagation::pull_inputs(graph, node_id);
            graph.scoped_call(node_id, "process", |b, scope| b.process(scope));
            graph.push_event(GraphEvent::NodeProcessed { node: node_id });
            propagation::push_outputs(graph, node_id);
            graph.scoped_call(node_id, "post-process", |b, scope| b.post_process(scope));
        }
    }
}
