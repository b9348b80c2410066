// SPDX-License-Identifier: MIT OR Apache-2.0
//! Value propagation along edges.
//!
//! Every edge carries a pass-through buffer. A node's outputs are pushed
//! into the buffers of its outgoing edges after it processes; its inputs
//! are pulled from the buffers of its incoming edges before. Processing
//! nodes in topological order therefore moves values strictly forward.

use crate::edge::{order_edges, EdgeId};
use crate::graph::Graph;
use crate::node::{NodeError, NodeId, NodeMessageSeverity, PortIo};
use crate::port::{NodePort, PortDirection};
use crate::value::{PortType, Value};
use std::collections::HashMap;
use std::sync::Arc;

struct TransferPlan {
    field: String,
    port: NodePort,
    custom_io: bool,
    ordered_edges: Vec<EdgeId>,
}

/// Plan the transfers for one direction: which ports move values, and in
/// which edge order. Computed read-only, before any buffer is touched.
fn transfer_plans(graph: &Graph, node_id: NodeId, direction: PortDirection) -> Vec<TransferPlan> {
    let Some(node) = graph.node(node_id) else {
        return Vec::new();
    };
    node.ports(direction)
        .iter()
        .filter_map(|port| {
            let custom_io = node
                .schema()
                .field(&port.field_name)
                .is_some_and(|f| f.custom_io);
            if port.edges.is_empty() && !custom_io {
                return None;
            }
            let positions: Vec<[f32; 2]> = port
                .edges
                .iter()
                .map(|id| {
                    graph
                        .edge(*id)
                        .and_then(|e| graph.node(e.output_node))
                        .map_or([0.0, 0.0], |n| n.position)
                })
                .collect();
            let ordered_edges = order_edges(
                port.descriptor.edge_process_order,
                port.edges.clone(),
                &positions,
            );
            Some(TransferPlan {
                field: port.field_name.clone(),
                port: port.clone(),
                custom_io,
                ordered_edges,
            })
        })
        .collect()
}

fn convert_incoming(
    adapters: &crate::adapter::TypeAdapterRegistry,
    value: Value,
    target: &PortType,
) -> Option<Value> {
    let from = value.value_type();
    if from == *target || matches!(target, PortType::Any) || matches!(from, PortType::Any) {
        return Some(value);
    }
    if adapters.are_assignable(&from, target) {
        return Some(adapters.convert(&value, target));
    }
    tracing::error!(
        "dropping value of type {:?} on a {:?} input: no registered conversion",
        from,
        target
    );
    None
}

/// Pull the values buffered on a node's incoming edges into its input
/// fields. Multi-edge inputs aggregate into a list in the port's edge
/// order; single inputs take the buffered value, adapter-converted to the
/// declared type.
pub(crate) fn pull_inputs(graph: &mut Graph, node_id: NodeId) {
    let adapters = Arc::clone(graph.adapters());
    let plans = transfer_plans(graph, node_id, PortDirection::Input);
    if plans.is_empty() {
        return;
    }

    let mut behavior = graph.node_mut(node_id).and_then(|n| n.behavior.take());
    let mut failures: Vec<NodeError> = Vec::new();

    for plan in &plans {
        let Some((node, edges, boundary)) = graph.node_edges_split(node_id) else {
            break;
        };
        let mut by_id: HashMap<EdgeId, &mut Option<Value>> = edges
            .iter_mut()
            .filter(|(id, _)| plan.ordered_edges.contains(*id))
            .map(|(id, e)| (*id, &mut e.pass_through_buffer))
            .collect();
        let buffers: Vec<&mut Option<Value>> = plan
            .ordered_edges
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();

        if plan.custom_io {
            if let Some(behavior) = behavior.as_mut() {
                let io = PortIo {
                    port: &plan.port,
                    buffers,
                    values: &mut node.values,
                    boundary,
                };
                if let Err(err) = behavior.pull(&plan.field, io) {
                    failures.push(err);
                }
            }
            continue;
        }

        let target = &plan.port.descriptor.display_type;
        if plan.port.is_multi_edge_input() {
            let items: Vec<Value> = buffers
                .into_iter()
                .filter_map(|buffer| buffer.clone())
                .filter_map(|value| convert_incoming(&adapters, value, target))
                .collect();
            node.values.set(plan.field.clone(), Value::List(items));
        } else if let Some(value) = buffers.into_iter().next().and_then(|b| b.clone()) {
            if let Some(converted) = convert_incoming(&adapters, value, target) {
                node.values.set_path(
                    &plan.field,
                    plan.port.descriptor.proxied_field.as_deref(),
                    converted,
                );
            }
        }
    }

    if let Some(behavior) = behavior {
        if let Some(node) = graph.node_mut(node_id) {
            node.behavior = Some(behavior);
        }
    }
    for err in failures {
        tracing::error!("node {:?} input transfer failed: {}", node_id, err);
        graph.add_node_message(node_id, err.0, NodeMessageSeverity::Error);
    }
}

/// Push a node's output field values into the buffers of its outgoing
/// edges. Values cross edges as-is; adapter conversion happens when the
/// consumer pulls.
pub(crate) fn push_outputs(graph: &mut Graph, node_id: NodeId) {
    let plans = transfer_plans(graph, node_id, PortDirection::Output);
    if plans.is_empty() {
        return;
    }

    let mut behavior = graph.node_mut(node_id).and_then(|n| n.behavior.take());
    let mut failures: Vec<NodeError> = Vec::new();

    for plan in &plans {
        let Some((node, edges, boundary)) = graph.node_edges_split(node_id) else {
            break;
        };
        let mut by_id: HashMap<EdgeId, &mut Option<Value>> = edges
            .iter_mut()
            .filter(|(id, _)| plan.ordered_edges.contains(*id))
            .map(|(id, e)| (*id, &mut e.pass_through_buffer))
            .collect();
        let buffers: Vec<&mut Option<Value>> = plan
            .ordered_edges
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();

        if plan.custom_io {
            if let Some(behavior) = behavior.as_mut() {
                let io = PortIo {
                    port: &plan.port,
                    buffers,
                    values: &mut node.values,
                    boundary,
                };
                if let Err(err) = behavior.push(&plan.field, io) {
                    failures.push(err);
                }
            }
            continue;
        }

        let value = node
            .values
            .get_path(&plan.field, plan.port.descriptor.proxied_field.as_deref())
            .cloned();
        for buffer in buffers {
            *buffer = value.clone();
        }
    }

    if let Some(behavior) = behavior {
        if let Some(node) = graph.node_mut(node_id) {
            node.behavior = Some(behavior);
        }
    }
    for err in failures {
        tracing::error!("node {:?} output transfer failed: {}", node_id, err);
        graph.add_node_message(node_id, err.0, NodeMessageSeverity::Error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::TypeAdapterRegistry;
    use crate::node::{InertBehavior, Node};
    use crate::port::EdgeProcessOrder;
    use crate::schema::NodeSchema;

    fn source(value: i32) -> Node {
        let schema = NodeSchema::builder("test.source", "Source")
            .output("out", PortType::Int)
            .build();
        let mut node = Node::new(schema, Box::new(InertBehavior));
        node.values.set("out", Value::Int(value));
        node
    }

    #[test]
    fn test_multi_edge_input_aggregates_lifo() {
        let mut graph = Graph::new("test", Arc::new(TypeAdapterRegistry::new()));
        let sources: Vec<_> = (1..=3).map(|i| graph.add_node(source(i))).collect();

        let schema = NodeSchema::builder("test.sum", "Sum")
            .multi_input("operands", PortType::Int, EdgeProcessOrder::Lifo)
            .build();
        let sum = graph.add_node(Node::new(schema, Box::new(InertBehavior)));

        for src in &sources {
            graph.connect(*src, ("out", ""), sum, ("operands", "")).unwrap();
        }
        for src in &sources {
            push_outputs(&mut graph, *src);
        }
        pull_inputs(&mut graph, sum);

        assert_eq!(
            graph.node(sum).unwrap().values.get("operands"),
            Some(&Value::List(vec![
                Value::Int(3),
                Value::Int(2),
                Value::Int(1)
            ]))
        );
    }

    #[test]
    fn test_single_input_converts_through_adapter() {
        let mut adapters = TypeAdapterRegistry::new();
        adapters.register(PortType::Int, PortType::Float, |v| match v {
            Value::Int(i) => Value::Float(*i as f32),
            other => other.clone(),
        });
        let mut graph = Graph::new("test", Arc::new(adapters));

        let src = graph.add_node(source(4));
        let schema = NodeSchema::builder("test.sink", "Sink")
            .input("x", PortType::Float)
            .build();
        let sink = graph.add_node(Node::new(schema, Box::new(InertBehavior)));

        graph.connect(src, ("out", ""), sink, ("x", "")).unwrap();
        push_outputs(&mut graph, src);
        pull_inputs(&mut graph, sink);

        assert_eq!(graph.node(sink).unwrap().values.get("x"), Some(&Value::Float(4.0)));
    }

    #[test]
    fn test_unconnected_input_keeps_its_value() {
        let mut graph = Graph::new("test", Arc::new(TypeAdapterRegistry::new()));
        let schema = NodeSchema::builder("test.sink", "Sink")
            .input("x", PortType::Int)
            .default_value(Value::Int(9))
            .build();
        let sink = graph.add_node(Node::new(schema, Box::new(InertBehavior)));

        pull_inputs(&mut graph, sink);
        assert_eq!(graph.node(sink).unwrap().values.get("x"), Some(&Value::Int(9)));
    }
}
