// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port binding engine: keeps each node's runtime port set synchronized
//! with what its schema and behavior currently describe.
//!
//! Resynchronization diffs desired descriptors against live ports keyed on
//! the port identifier, so untouched ports keep their edges across a
//! resync. A change on one node can invalidate the desired ports of its
//! neighbors, so field-level updates cascade breadth-first through
//! connected nodes, bounded by a visited set and an iteration cap.

use crate::graph::{Graph, GraphEvent};
use crate::node::{BehaviorScope, ConnectedEdge, Node, NodeId};
use crate::port::{NodePort, PortDescriptor, PortDirection};
use crate::schema::FieldSchema;
use crate::value::{PortType, Value};
use std::collections::{HashSet, VecDeque};

/// Upper bound on field updates processed by one cascade. Mutually
/// re-triggering behaviors that never reach a fixed point hit this cap
/// instead of hanging the caller.
pub const CASCADE_ITERATION_CAP: usize = 1024;

/// Outcome of a port resynchronization cascade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortSyncReport {
    /// Whether any port set changed
    pub changed: bool,
    /// Whether the cascade hit [`CASCADE_ITERATION_CAP`] before settling
    pub guard_exhausted: bool,
}

impl PortSyncReport {
    fn merge(&mut self, other: PortSyncReport) {
        self.changed |= other.changed;
        self.guard_exhausted |= other.guard_exhausted;
    }
}

/// Whether the field's port set is computed rather than fixed by schema.
fn has_custom_behavior(node: &Node, field: &FieldSchema) -> bool {
    field.custom_behavior
        || field.nested
        || node
            .behavior
            .as_deref()
            .is_some_and(|b| b.handles_type(&field.value_type))
}

/// Edges currently connected to a field's ports, with the remote endpoint
/// resolved for the behavior's benefit.
fn connected_edges(graph: &Graph, node: &Node, field: &str) -> Vec<ConnectedEdge> {
    let mut edges = Vec::new();
    for port in node.all_ports().filter(|p| p.field_name == field) {
        for &edge_id in &port.edges {
            let Some(edge) = graph.edge(edge_id) else {
                continue;
            };
            let (remote_node, remote_field, remote_identifier) = if edge.input_node == node.id {
                (
                    edge.output_node,
                    edge.output_field.clone(),
                    edge.output_identifier.clone(),
                )
            } else {
                (
                    edge.input_node,
                    edge.input_field.clone(),
                    edge.input_identifier.clone(),
                )
            };
            let remote_type = graph
                .node(remote_node)
                .and_then(|n| n.get_port(&remote_field, &remote_identifier))
                .map(|p| p.descriptor.display_type.clone())
                .unwrap_or(PortType::Any);
            edges.push(ConnectedEdge {
                edge: edge_id,
                remote_node,
                remote_field,
                remote_identifier,
                remote_type,
            });
        }
    }
    edges
}

/// Compute the descriptor set a custom-behavior field should expose right
/// now. `None` means the behavior did not answer for a field that requires
/// it, which is a node configuration error.
fn desired_descriptors(graph: &Graph, node: &Node, field: &FieldSchema) -> Option<Vec<PortDescriptor>> {
    if field.nested {
        let Some(Value::Map(entries)) = node.values.get(&field.field_name) else {
            return Some(Vec::new());
        };
        return Some(
            entries
                .iter()
                .map(|(key, value)| {
                    let mut descriptor = PortDescriptor::new(key.clone(), value.value_type());
                    descriptor.proxied_field = Some(key.clone());
                    descriptor
                })
                .collect(),
        );
    }

    let behavior = node.behavior.as_deref()?;
    if field.custom_behavior {
        let scope = BehaviorScope {
            node: node.id,
            field: field.field_name.clone(),
            edges: connected_edges(graph, node, &field.field_name),
            value: node.values.get(&field.field_name).cloned(),
            ingress_ports: graph.ingress_port_data(),
            egress_ports: graph.egress_port_data(),
        };
        behavior.ports_for_field(&field.field_name, &scope)
    } else {
        behavior.ports_for_type(
            &field.value_type,
            &field.field_name,
            &field.display_name,
            node.values.get(&field.field_name),
        )
    }
}

/// Resynchronize the ports of one field on one node, without cascading to
/// neighbors. Returns whether the port set changed.
pub fn update_ports_for_field_local(
    graph: &mut Graph,
    node_id: NodeId,
    field_name: &str,
    send_event: bool,
) -> bool {
    let Some(node) = graph.node(node_id) else {
        return false;
    };
    let Some(field) = node.schema().field(field_name).cloned() else {
        return false;
    };
    if !has_custom_behavior(node, &field) {
        return false;
    }

    let Some(desired) = desired_descriptors(graph, node, &field) else {
        tracing::error!(
            "field {} of node {:?} is declared dynamic but its behavior computes no ports",
            field_name,
            node_id
        );
        return false;
    };
    let direction = field.direction;
    let mut changed = false;

    // Create missing ports and update descriptors in place. A retype under
    // live edges tears the edges down only when the old and new types are
    // no longer connectable; a compatible retype keeps them.
    for descriptor in &desired {
        let existing = graph
            .node(node_id)
            .and_then(|n| {
                n.ports(direction)
                    .iter()
                    .find(|p| p.field_name == field_name && p.descriptor.identifier == descriptor.identifier)
            })
            .map(|p| (p.descriptor.clone(), p.edges.clone()));

        match existing {
            None => {
                graph.add_port(node_id, direction, field_name, descriptor.clone());
                changed = true;
            }
            Some((current, edges)) if current != *descriptor => {
                let compatible = graph
                    .adapters()
                    .types_are_connectable(&current.display_type, &descriptor.display_type);
                if !compatible {
                    for edge in edges {
                        graph.disconnect_no_sync(edge);
                    }
                }
                if let Some(port) = graph.node_mut(node_id).and_then(|n| {
                    n.ports_mut(direction)
                        .iter_mut()
                        .find(|p| p.field_name == field_name && p.descriptor.identifier == descriptor.identifier)
                }) {
                    port.descriptor.copy_from(descriptor);
                }
                changed = true;
            }
            Some(_) => {}
        }
    }

    // Remove ports the behavior no longer wants, edges first.
    let desired_ids: HashSet<&str> = desired.iter().map(|d| d.identifier.as_str()).collect();
    let stale: Vec<(String, Vec<crate::edge::EdgeId>)> = graph
        .node(node_id)
        .map(|n| {
            n.ports(direction)
                .iter()
                .filter(|p| p.field_name == field_name && !desired_ids.contains(p.descriptor.identifier.as_str()))
                .map(|p| (p.descriptor.identifier.clone(), p.edges.clone()))
                .collect()
        })
        .unwrap_or_default();
    for (identifier, edges) in stale {
        for edge in edges {
            graph.disconnect_no_sync(edge);
        }
        if let Some(n) = graph.node_mut(node_id) {
            n.ports_mut(direction)
                .retain(|p| !(p.field_name == field_name && p.descriptor.identifier == identifier));
        }
        changed = true;
    }

    let desired_order: Vec<String> = desired.into_iter().map(|d| d.identifier).collect();
    if let Some(n) = graph.node_mut(node_id) {
        changed |= reorder_field_ports(n, direction, field_name, &desired_order);
    }

    if changed && send_event {
        graph.push_event(GraphEvent::PortsUpdated {
            node: node_id,
            field: field_name.to_string(),
        });
    }
    changed
}

/// Reorder the field's ports to match the desired identifier order, leaving
/// the slots of other fields' ports untouched.
fn reorder_field_ports(
    node: &mut Node,
    direction: PortDirection,
    field_name: &str,
    desired_order: &[String],
) -> bool {
    let container = node.ports_mut(direction);
    let slots: Vec<usize> = container
        .iter()
        .enumerate()
        .filter(|(_, p)| p.field_name == field_name)
        .map(|(i, _)| i)
        .collect();
    if slots.len() < 2 {
        return false;
    }

    let mut ports: Vec<NodePort> = slots.iter().map(|&i| container[i].clone()).collect();
    let before: Vec<String> = ports.iter().map(|p| p.descriptor.identifier.clone()).collect();
    ports.sort_by_key(|p| {
        desired_order
            .iter()
            .position(|id| *id == p.descriptor.identifier)
            .unwrap_or(usize::MAX)
    });
    let changed = ports
        .iter()
        .map(|p| p.descriptor.identifier.as_str())
        .ne(before.iter().map(String::as_str));
    for (slot, port) in slots.into_iter().zip(ports) {
        container[slot] = port;
    }
    changed
}

/// Resynchronize one field and cascade the update breadth-first through
/// connected nodes. Each changed field enqueues the fields behind the
/// remote ports of its edges; a visited set keeps cyclic graphs from
/// looping and [`CASCADE_ITERATION_CAP`] bounds pathological behaviors.
pub fn update_ports_for_field(graph: &mut Graph, node_id: NodeId, field_name: &str) -> PortSyncReport {
    let mut report = PortSyncReport::default();
    let mut queue: VecDeque<(NodeId, String)> = VecDeque::new();
    let mut visited: HashSet<(NodeId, String)> = HashSet::new();
    queue.push_back((node_id, field_name.to_string()));

    let mut iterations = 0usize;
    while let Some((node, field)) = queue.pop_front() {
        iterations += 1;
        if iterations > CASCADE_ITERATION_CAP {
            tracing::warn!(
                "port resync starting at {:?}.{} exceeded {} field updates; stopping",
                node_id,
                field_name,
                CASCADE_ITERATION_CAP
            );
            report.guard_exhausted = true;
            break;
        }
        if !visited.insert((node, field.clone())) {
            continue;
        }
        if !update_ports_for_field_local(graph, node, &field, true) {
            continue;
        }
        report.changed = true;

        let neighbors: Vec<(NodeId, String)> = graph
            .node(node)
            .map(|n| {
                n.all_ports()
                    .filter(|p| p.field_name == field)
                    .flat_map(|p| p.edges.iter())
                    .filter_map(|edge_id| graph.edge(*edge_id))
                    .map(|edge| {
                        if edge.input_node == node {
                            (edge.output_node, edge.output_field.clone())
                        } else {
                            (edge.input_node, edge.input_field.clone())
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        queue.extend(neighbors);
    }
    report
}

/// Resynchronize every field of a node, cascading through neighbors.
pub fn update_all_ports(graph: &mut Graph, node_id: NodeId) -> PortSyncReport {
    let fields: Vec<String> = graph
        .node(node_id)
        .map(|n| n.schema().fields.keys().cloned().collect())
        .unwrap_or_default();
    let mut report = PortSyncReport::default();
    for field in fields {
        report.merge(update_ports_for_field(graph, node_id, &field));
    }
    report
}

/// Resynchronize every field of a node without cascading.
pub fn update_all_ports_local(graph: &mut Graph, node_id: NodeId) -> bool {
    let fields: Vec<String> = graph
        .node(node_id)
        .map(|n| n.schema().fields.keys().cloned().collect())
        .unwrap_or_default();
    let mut changed = false;
    for field in fields {
        changed |= update_ports_for_field_local(graph, node_id, &field, true);
    }
    changed
}

/// Build the initial port set of a freshly added node: one fixed port per
/// plain field, a behavior-computed set for dynamic fields.
pub(crate) fn initialize_ports(graph: &mut Graph, node_id: NodeId) {
    let Some(node) = graph.node(node_id) else {
        return;
    };
    let fields: Vec<FieldSchema> = node.schema().fields.values().cloned().collect();

    for field in fields {
        let dynamic = graph
            .node(node_id)
            .is_some_and(|n| has_custom_behavior(n, &field));
        if dynamic {
            update_ports_for_field_local(graph, node_id, &field.field_name, false);
            continue;
        }

        // Multi-edge inputs declare the collection type but expose the
        // element type on the port.
        let display_type = if field.direction == PortDirection::Input && field.accept_multiple_edges
        {
            field.value_type.element_type()
        } else {
            field.value_type.clone()
        };
        let mut descriptor = PortDescriptor::new("", display_type)
            .with_display_name(field.display_name.clone())
            .with_edge_process_order(field.edge_process_order);
        descriptor.accept_multiple_edges = field.accept_multiple_edges;
        descriptor.show_as_drawer = field.show_as_drawer;
        descriptor.vertical = field.vertical;
        descriptor.tooltip = field.tooltip.clone();
        graph.add_port(node_id, field.direction, &field.field_name, descriptor);
    }
}
