// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph container: owns nodes and edges and is the transaction boundary
//! for connect/disconnect.

use crate::adapter::TypeAdapterRegistry;
use crate::binding;
use crate::edge::{Edge, EdgeId};
use crate::node::{Node, NodeBehavior, NodeError, NodeId, NodeMessageSeverity, ProcessScope};
use crate::port::{NodePort, PortDescriptor, PortDirection};
use crate::subgraph::{BoundaryBuffers, SubGraphBoundary};
use crate::value::{PortType, Value};
use indexmap::IndexMap;
use std::sync::Arc;

/// Notification emitted by the core for the (optional) view layer, drained
/// with [`Graph::take_events`]. The core never depends on a view existing.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    /// A node's title changed
    TitleChanged {
        /// The renamed node
        node: NodeId,
    },
    /// The port set generated by one field changed
    PortsUpdated {
        /// The affected node
        node: NodeId,
        /// The resynchronized field
        field: String,
    },
    /// A diagnostic message was attached to a node
    MessageAdded {
        /// The affected node
        node: NodeId,
        /// Message text
        text: String,
        /// Message severity
        severity: NodeMessageSeverity,
    },
    /// A diagnostic message was removed from a node
    MessageRemoved {
        /// The affected node
        node: NodeId,
        /// Message text
        text: String,
    },
    /// A node finished its processing callback
    NodeProcessed {
        /// The processed node
        node: NodeId,
    },
    /// An edge was connected
    EdgeConnected {
        /// The new edge
        edge: EdgeId,
    },
    /// An edge was disconnected
    EdgeDisconnected {
        /// The removed edge
        edge: EdgeId,
    },
}

/// Error when connecting two ports
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectError {
    /// Node not found in this graph
    #[error("node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// Port not found on the node
    #[error("port not found: {field}:{identifier:?} on {node:?}")]
    PortNotFound {
        /// The node that was searched
        node: NodeId,
        /// Field name of the missing port
        field: String,
        /// Identifier of the missing port
        identifier: String,
    },

    /// The named port has the wrong direction for its role
    #[error("port {field} on {node:?} is not an {expected:?} port")]
    DirectionMismatch {
        /// The node owning the port
        node: NodeId,
        /// Field name of the port
        field: String,
        /// The direction the port was expected to have
        expected: PortDirection,
    },

    /// Port types are not connectable and no adapter is registered
    #[error("cannot connect {output:?} to {input:?}: no registered conversion")]
    IncompatibleTypes {
        /// Producing port type
        output: PortType,
        /// Consuming port type
        input: PortType,
    },

    /// The port does not accept another edge
    #[error("port {field} on {node:?} already has an edge and does not accept multiple")]
    PortAlreadyConnected {
        /// The node owning the port
        node: NodeId,
        /// Field name of the port
        field: String,
    },

    /// Self-loop not allowed
    #[error("self-loop not allowed")]
    SelfLoop,
}

/// A dataflow graph: node collection, edge collection, and the registries
/// shared by its nodes.
pub struct Graph {
    /// Graph name
    pub name: String,
    nodes: IndexMap<NodeId, Node>,
    edges: IndexMap<EdgeId, Edge>,
    adapters: Arc<TypeAdapterRegistry>,
    events: Vec<GraphEvent>,
    pub(crate) boundary: Option<SubGraphBoundary>,
    pub(crate) boundary_buffers: BoundaryBuffers,
}

impl Graph {
    /// Create a new empty graph sharing the given adapter registry.
    pub fn new(name: impl Into<String>, adapters: Arc<TypeAdapterRegistry>) -> Self {
        Self {
            name: name.into(),
            nodes: IndexMap::new(),
            edges: IndexMap::new(),
            adapters,
            events: Vec::new(),
            boundary: None,
            boundary_buffers: BoundaryBuffers::default(),
        }
    }

    /// The adapter registry governing this graph's connectivity.
    pub fn adapters(&self) -> &Arc<TypeAdapterRegistry> {
        &self.adapters
    }

    /// Add a node to the graph: binds it (guarded `on_enabled`) and builds
    /// its initial port set from its schema.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id;
        self.nodes.insert(id, node);
        self.lifecycle_call(id, "enable", |b| b.on_enabled());
        binding::initialize_ports(self, id);
        id
    }

    /// Remove a node and disconnect all of its edges. Returns `None` when
    /// the node does not exist or its schema forbids deletion.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let node = self.nodes.get(&node_id)?;
        if !node.schema().deletable {
            tracing::warn!("refusing to remove non-deletable node {:?}", node_id);
            return None;
        }
        let edges: Vec<EdgeId> = node.all_edges().collect();
        for edge in edges {
            self.disconnect(edge);
        }
        self.lifecycle_call(node_id, "disable", |b| b.on_disabled());
        self.lifecycle_call(node_id, "destroy", |b| b.on_destroyed());
        self.nodes.shift_remove(&node_id)
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Get all nodes, in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get all node IDs, in insertion order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get an edge by ID
    pub fn edge(&self, edge_id: EdgeId) -> Option<&Edge> {
        self.edges.get(&edge_id)
    }

    /// Get all edges
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Get the number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Get all edges involving a node
    pub fn edges_for_node(&self, node_id: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.values().filter(move |e| e.involves_node(node_id))
    }

    /// Connect an output port to an input port. Validates direction, type
    /// compatibility (via the adapter registry) and multiplicity; rejection
    /// mutates nothing. On success both endpoint nodes resynchronize their
    /// custom-behavior ports.
    pub fn connect(
        &mut self,
        output_node: NodeId,
        output_port: (&str, &str),
        input_node: NodeId,
        input_port: (&str, &str),
    ) -> Result<EdgeId, ConnectError> {
        self.connect_with_id(EdgeId::new(), output_node, output_port, input_node, input_port)
    }

    pub(crate) fn connect_with_id(
        &mut self,
        edge_id: EdgeId,
        output_node: NodeId,
        (output_field, output_identifier): (&str, &str),
        input_node: NodeId,
        (input_field, input_identifier): (&str, &str),
    ) -> Result<EdgeId, ConnectError> {
        if output_node == input_node {
            return Err(ConnectError::SelfLoop);
        }

        let producer = self
            .nodes
            .get(&output_node)
            .ok_or(ConnectError::NodeNotFound(output_node))?;
        let consumer = self
            .nodes
            .get(&input_node)
            .ok_or(ConnectError::NodeNotFound(input_node))?;

        let out_port = Self::resolve_port(
            producer,
            output_field,
            output_identifier,
            PortDirection::Output,
        )?;
        let in_port = Self::resolve_port(
            consumer,
            input_field,
            input_identifier,
            PortDirection::Input,
        )?;

        let out_type = &out_port.descriptor.display_type;
        let in_type = &in_port.descriptor.display_type;
        if !self.adapters.types_are_connectable(out_type, in_type) {
            tracing::error!(
                "cannot connect {:?} to {:?}: register a type adapter for non-implicit conversions",
                out_type,
                in_type
            );
            return Err(ConnectError::IncompatibleTypes {
                output: out_type.clone(),
                input: in_type.clone(),
            });
        }

        if !in_port.descriptor.accept_multiple_edges && !in_port.edges.is_empty() {
            return Err(ConnectError::PortAlreadyConnected {
                node: input_node,
                field: input_field.to_string(),
            });
        }
        if !out_port.descriptor.accept_multiple_edges && !out_port.edges.is_empty() {
            return Err(ConnectError::PortAlreadyConnected {
                node: output_node,
                field: output_field.to_string(),
            });
        }

        let edge = Edge::new(
            edge_id,
            output_node,
            output_field,
            output_identifier,
            input_node,
            input_field,
            input_identifier,
        );
        self.edges.insert(edge_id, edge);

        if let Some(port) = self
            .nodes
            .get_mut(&output_node)
            .and_then(|n| n.get_port_mut(output_field, output_identifier))
        {
            port.add_edge(edge_id);
        }
        if let Some(port) = self
            .nodes
            .get_mut(&input_node)
            .and_then(|n| n.get_port_mut(input_field, input_identifier))
        {
            port.add_edge(edge_id);
        }

        self.push_event(GraphEvent::EdgeConnected { edge: edge_id });

        binding::update_all_ports(self, output_node);
        binding::update_all_ports(self, input_node);

        Ok(edge_id)
    }

    fn resolve_port<'a>(
        node: &'a Node,
        field: &str,
        identifier: &str,
        expected: PortDirection,
    ) -> Result<&'a NodePort, ConnectError> {
        match node.get_port(field, identifier) {
            Some(port) if port.direction == expected => Ok(port),
            Some(_) => Err(ConnectError::DirectionMismatch {
                node: node.id,
                field: field.to_string(),
                expected,
            }),
            None => Err(ConnectError::PortNotFound {
                node: node.id,
                field: field.to_string(),
                identifier: identifier.to_string(),
            }),
        }
    }

    /// Remove an edge. When the consuming port's field loses its last edge
    /// and the node permits the reset, the backing field returns to its
    /// type's zero-value. Both endpoint nodes resynchronize their ports.
    pub fn disconnect(&mut self, edge_id: EdgeId) -> Option<Edge> {
        self.disconnect_inner(edge_id, true)
    }

    /// Disconnect without cascading a port resync; used inside the binding
    /// engine, which drives propagation through its own work queue.
    pub(crate) fn disconnect_no_sync(&mut self, edge_id: EdgeId) -> Option<Edge> {
        self.disconnect_inner(edge_id, false)
    }

    fn disconnect_inner(&mut self, edge_id: EdgeId, sync: bool) -> Option<Edge> {
        let edge = self.edges.shift_remove(&edge_id)?;

        if let Some(node) = self.nodes.get_mut(&edge.output_node) {
            for port in node.ports_mut(PortDirection::Output) {
                port.remove_edge(&edge_id);
            }
        }
        if let Some(node) = self.nodes.get_mut(&edge.input_node) {
            for port in node.ports_mut(PortDirection::Input) {
                port.remove_edge(&edge_id);
            }
        }

        self.reset_input_if_unconnected(&edge);
        self.push_event(GraphEvent::EdgeDisconnected { edge: edge_id });

        if sync {
            binding::update_all_ports(self, edge.output_node);
            binding::update_all_ports(self, edge.input_node);
        }

        Some(edge)
    }

    fn reset_input_if_unconnected(&mut self, edge: &Edge) {
        let Some(node) = self.nodes.get(&edge.input_node) else {
            return;
        };
        let field = edge.input_field.as_str();
        let still_connected = node
            .ports(PortDirection::Input)
            .iter()
            .filter(|p| p.field_name == field)
            .any(|p| !p.edges.is_empty());
        if still_connected {
            return;
        }
        let Some(value_type) = node.schema().field(field).map(|f| f.value_type.clone()) else {
            return;
        };

        let permitted = self
            .nodes
            .get_mut(&edge.input_node)
            .and_then(|n| n.behavior.take())
            .map_or(true, |behavior| {
                let allowed = behavior.can_reset_port(field);
                if let Some(n) = self.nodes.get_mut(&edge.input_node) {
                    n.behavior = Some(behavior);
                }
                allowed
            });
        if !permitted {
            return;
        }

        if let Some(node) = self.nodes.get_mut(&edge.input_node) {
            node.values.set(field, Value::default_of(&value_type));
        }
    }

    /// Add a port to a node. Structural mutation only; the binding engine
    /// uses this when applying a desired descriptor set.
    pub fn add_port(
        &mut self,
        node_id: NodeId,
        direction: PortDirection,
        field: &str,
        descriptor: PortDescriptor,
    ) {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.ports_mut(direction)
                .push(NodePort::new(field, direction, descriptor));
        }
    }

    /// Remove a port from a node, first disconnecting any live edges on it.
    pub fn remove_port(
        &mut self,
        node_id: NodeId,
        direction: PortDirection,
        field: &str,
        identifier: &str,
    ) {
        let edges: Vec<EdgeId> = self
            .nodes
            .get(&node_id)
            .and_then(|n| n.get_port(field, identifier))
            .map(|p| p.edges.clone())
            .unwrap_or_default();
        for edge in edges {
            self.disconnect(edge);
        }
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.ports_mut(direction)
                .retain(|p| !p.matches(field, identifier));
        }
    }

    /// Set a node's canvas position.
    pub fn set_node_position(&mut self, node_id: NodeId, position: [f32; 2]) {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.position = position;
        }
    }

    /// Set or clear a node's custom display name. Ignored (with a warning)
    /// for non-renamable node types.
    pub fn set_node_custom_name(&mut self, node_id: NodeId, name: Option<String>) {
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        if !node.schema().renamable {
            tracing::warn!("refusing to rename non-renamable node {:?}", node_id);
            return;
        }
        node.set_custom_name(name);
        self.push_event(GraphEvent::TitleChanged { node: node_id });
    }

    /// Attach a diagnostic message to a node; duplicate text is a no-op.
    pub fn add_node_message(
        &mut self,
        node_id: NodeId,
        text: impl Into<String>,
        severity: NodeMessageSeverity,
    ) {
        let text = text.into();
        let added = self
            .nodes
            .get_mut(&node_id)
            .is_some_and(|n| n.add_message(text.clone(), severity));
        if added {
            self.push_event(GraphEvent::MessageAdded {
                node: node_id,
                text,
                severity,
            });
        }
    }

    /// Remove a diagnostic message from a node by exact text.
    pub fn remove_node_message(&mut self, node_id: NodeId, text: &str) {
        let removed = self
            .nodes
            .get_mut(&node_id)
            .is_some_and(|n| n.remove_message(text));
        if removed {
            self.push_event(GraphEvent::MessageRemoved {
                node: node_id,
                text: text.to_string(),
            });
        }
    }

    /// Remove all diagnostic messages from a node.
    pub fn clear_node_messages(&mut self, node_id: NodeId) {
        let removed = self
            .nodes
            .get_mut(&node_id)
            .map(Node::clear_messages)
            .unwrap_or_default();
        for message in removed {
            self.push_event(GraphEvent::MessageRemoved {
                node: node_id,
                text: message.text,
            });
        }
    }

    /// Drain the queued view notifications.
    pub fn take_events(&mut self) -> Vec<GraphEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn push_event(&mut self, event: GraphEvent) {
        self.events.push(event);
    }

    /// Ingress/egress value buffers when this graph is a subgraph body.
    pub fn boundary_buffers(&self) -> &BoundaryBuffers {
        &self.boundary_buffers
    }

    /// Nodes feeding this node's input ports.
    pub fn input_nodes(&self, node_id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.edges
            .values()
            .filter(move |e| e.input_node == node_id)
            .map(|e| e.output_node)
    }

    /// Nodes fed by this node's output ports.
    pub fn output_nodes(&self, node_id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.edges
            .values()
            .filter(move |e| e.output_node == node_id)
            .map(|e| e.input_node)
    }

    /// Walk the input dependencies of a node (depth-first, bounded) and
    /// return the first node matching the predicate.
    pub fn find_in_dependencies(
        &self,
        start: NodeId,
        mut predicate: impl FnMut(&Node) -> bool,
    ) -> Option<NodeId> {
        let mut stack = vec![start];
        let mut depth = 0;
        while let Some(id) = stack.pop() {
            depth += 1;
            if depth > 2000 {
                break;
            }
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if predicate(node) {
                return Some(id);
            }
            stack.extend(self.input_nodes(id));
        }
        None
    }

    /// Borrow one node, the edge map and the boundary buffers at the same
    /// time; value propagation needs all three mutably.
    pub(crate) fn node_edges_split(
        &mut self,
        node_id: NodeId,
    ) -> Option<(&mut Node, &mut IndexMap<EdgeId, Edge>, &mut BoundaryBuffers)> {
        let Self {
            nodes,
            edges,
            boundary_buffers,
            ..
        } = self;
        Some((nodes.get_mut(&node_id)?, edges, boundary_buffers))
    }

    /// Run a lifecycle hook that takes no scope; failures are logged and
    /// recorded as node messages, never propagated.
    pub(crate) fn lifecycle_call(
        &mut self,
        node_id: NodeId,
        stage: &str,
        f: impl FnOnce(&mut dyn NodeBehavior) -> Result<(), NodeError>,
    ) {
        let Some(mut behavior) = self.nodes.get_mut(&node_id).and_then(|n| n.behavior.take())
        else {
            return;
        };
        let result = f(behavior.as_mut());
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.behavior = Some(behavior);
        }
        if let Err(err) = result {
            tracing::error!("node {:?} {} failed: {}", node_id, stage, err);
            self.add_node_message(node_id, err.0, NodeMessageSeverity::Error);
        }
    }

    /// Run a processing-stage hook with a [`ProcessScope`]; failures are
    /// logged and recorded, never propagated.
    pub(crate) fn scoped_call(
        &mut self,
        node_id: NodeId,
        stage: &str,
        f: impl FnOnce(&mut dyn NodeBehavior, &mut ProcessScope<'_>) -> Result<(), NodeError>,
    ) {
        let Some(mut behavior) = self.nodes.get_mut(&node_id).and_then(|n| n.behavior.take())
        else {
            return;
        };
        let (result, pending) = {
            let Some(node) = self.nodes.get_mut(&node_id) else {
                return;
            };
            let mut scope = ProcessScope {
                node: node_id,
                values: &mut node.values,
                boundary: &mut self.boundary_buffers,
                pending_messages: Vec::new(),
            };
            let result = f(behavior.as_mut(), &mut scope);
            (result, scope.pending_messages)
        };
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.behavior = Some(behavior);
        }
        for (text, severity) in pending {
            self.add_node_message(node_id, text, severity);
        }
        if let Err(err) = result {
            tracing::error!("node {:?} {} failed: {}", node_id, stage, err);
            self.add_node_message(node_id, err.0, NodeMessageSeverity::Error);
        }
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{InertBehavior, NodeBehavior};
    use crate::port::EdgeProcessOrder;
    use crate::schema::NodeSchema;

    fn graph() -> Graph {
        Graph::new("test", Arc::new(TypeAdapterRegistry::new()))
    }

    fn int_source() -> Node {
        let schema = NodeSchema::builder("test.source", "Source")
            .output("out", PortType::Int)
            .build();
        Node::new(schema, Box::new(InertBehavior))
    }

    fn sink(value_type: PortType) -> Node {
        let schema = NodeSchema::builder("test.sink", "Sink")
            .input("x", value_type)
            .build();
        Node::new(schema, Box::new(InertBehavior))
    }

    #[test]
    fn test_connect_rejects_incompatible_types_without_mutating() {
        let mut graph = graph();
        let source = graph.add_node(int_source());
        let consumer = graph.add_node(sink(PortType::String));

        let result = graph.connect(source, ("out", ""), consumer, ("x", ""));
        assert!(matches!(result, Err(ConnectError::IncompatibleTypes { .. })));
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.node(source).unwrap().output_ports[0].edges.is_empty());
        assert!(graph.node(consumer).unwrap().input_ports[0].edges.is_empty());
    }

    #[test]
    fn test_single_input_rejects_a_second_edge() {
        let mut graph = graph();
        let first = graph.add_node(int_source());
        let second = graph.add_node(int_source());
        let consumer = graph.add_node(sink(PortType::Int));

        graph.connect(first, ("out", ""), consumer, ("x", "")).unwrap();
        let result = graph.connect(second, ("out", ""), consumer, ("x", ""));
        assert!(matches!(result, Err(ConnectError::PortAlreadyConnected { .. })));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_self_loop_is_rejected() {
        let mut graph = graph();
        let schema = NodeSchema::builder("test.loop", "Loop")
            .input("x", PortType::Int)
            .output("out", PortType::Int)
            .build();
        let node = graph.add_node(Node::new(schema, Box::new(InertBehavior)));
        let result = graph.connect(node, ("out", ""), node, ("x", ""));
        assert!(matches!(result, Err(ConnectError::SelfLoop)));
    }

    #[test]
    fn test_connect_checks_port_direction() {
        let mut graph = graph();
        let a = graph.add_node(int_source());
        let b = graph.add_node(int_source());
        let result = graph.connect(a, ("out", ""), b, ("out", ""));
        assert!(matches!(result, Err(ConnectError::DirectionMismatch { .. })));
    }

    #[test]
    fn test_disconnect_resets_input_to_zero_value() {
        let mut graph = graph();
        let source = graph.add_node(int_source());
        let consumer = graph.add_node(sink(PortType::Int));
        let edge = graph.connect(source, ("out", ""), consumer, ("x", "")).unwrap();

        graph.node_mut(consumer).unwrap().values.set("x", Value::Int(99));
        graph.disconnect(edge);

        assert_eq!(graph.node(consumer).unwrap().values.get("x"), Some(&Value::Int(0)));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_disconnect_resets_multi_input_to_empty_list() {
        let mut graph = graph();
        let source = graph.add_node(int_source());
        let schema = NodeSchema::builder("test.sum", "Sum")
            .multi_input("operands", PortType::Int, EdgeProcessOrder::Fifo)
            .build();
        let consumer = graph.add_node(Node::new(schema, Box::new(InertBehavior)));
        let edge = graph
            .connect(source, ("out", ""), consumer, ("operands", ""))
            .unwrap();

        graph
            .node_mut(consumer)
            .unwrap()
            .values
            .set("operands", Value::List(vec![Value::Int(7)]));
        graph.disconnect(edge);

        assert_eq!(
            graph.node(consumer).unwrap().values.get("operands"),
            Some(&Value::List(Vec::new()))
        );
    }

    #[test]
    fn test_disconnect_resets_untyped_input_to_null() {
        let mut graph = graph();
        let source = graph.add_node(int_source());
        let consumer = graph.add_node(sink(PortType::Any));
        let edge = graph.connect(source, ("out", ""), consumer, ("x", "")).unwrap();

        graph.node_mut(consumer).unwrap().values.set("x", Value::Int(5));
        graph.disconnect(edge);

        assert_eq!(graph.node(consumer).unwrap().values.get("x"), Some(&Value::Null));
    }

    struct KeepOnDisconnect;

    impl NodeBehavior for KeepOnDisconnect {
        fn can_reset_port(&self, _field: &str) -> bool {
            false
        }
    }

    #[test]
    fn test_disconnect_reset_honors_behavior_veto() {
        let mut graph = graph();
        let source = graph.add_node(int_source());
        let schema = NodeSchema::builder("test.sticky", "Sticky")
            .input("x", PortType::Int)
            .build();
        let consumer = graph.add_node(Node::new(schema, Box::new(KeepOnDisconnect)));
        let edge = graph.connect(source, ("out", ""), consumer, ("x", "")).unwrap();

        graph.node_mut(consumer).unwrap().values.set("x", Value::Int(99));
        graph.disconnect(edge);

        assert_eq!(graph.node(consumer).unwrap().values.get("x"), Some(&Value::Int(99)));
    }

    #[test]
    fn test_remove_node_tears_down_its_edges() {
        let mut graph = graph();
        let source = graph.add_node(int_source());
        let consumer = graph.add_node(sink(PortType::Int));
        graph.connect(source, ("out", ""), consumer, ("x", "")).unwrap();

        assert!(graph.remove_node(source).is_some());
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.node(consumer).unwrap().input_ports[0].edges.is_empty());
    }

    #[test]
    fn test_remove_port_disconnects_its_edges_first() {
        let mut graph = graph();
        let source = graph.add_node(int_source());
        let consumer = graph.add_node(sink(PortType::Int));
        graph.connect(source, ("out", ""), consumer, ("x", "")).unwrap();

        graph.remove_port(consumer, PortDirection::Input, "x", "");

        assert_eq!(graph.edge_count(), 0);
        assert!(graph.node(consumer).unwrap().input_ports.is_empty());
        assert!(graph.node(source).unwrap().output_ports[0].edges.is_empty());
    }

    #[test]
    fn test_non_deletable_node_is_kept() {
        let mut graph = graph();
        let schema = NodeSchema::builder("test.pinned", "Pinned")
            .output("out", PortType::Int)
            .not_deletable()
            .build();
        let node = graph.add_node(Node::new(schema, Box::new(InertBehavior)));
        assert!(graph.remove_node(node).is_none());
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_rename_respects_schema_and_emits_event() {
        let mut graph = graph();
        let renamable = graph.add_node(int_source());
        let schema = NodeSchema::builder("test.fixed", "Fixed")
            .output("out", PortType::Int)
            .not_renamable()
            .build();
        let fixed = graph.add_node(Node::new(schema, Box::new(InertBehavior)));
        graph.take_events();

        graph.set_node_custom_name(renamable, Some("custom".to_string()));
        graph.set_node_custom_name(fixed, Some("nope".to_string()));

        assert_eq!(graph.node(renamable).unwrap().title(), "custom");
        assert_eq!(graph.node(fixed).unwrap().title(), "Fixed");
        let events = graph.take_events();
        assert_eq!(events, vec![GraphEvent::TitleChanged { node: renamable }]);
    }

    #[test]
    fn test_connect_and_disconnect_emit_events() {
        let mut graph = graph();
        let source = graph.add_node(int_source());
        let consumer = graph.add_node(sink(PortType::Int));
        graph.take_events();

        let edge = graph.connect(source, ("out", ""), consumer, ("x", "")).unwrap();
        graph.disconnect(edge);

        let events = graph.take_events();
        assert!(events.contains(&GraphEvent::EdgeConnected { edge }));
        assert!(events.contains(&GraphEvent::EdgeDisconnected { edge }));
    }

    #[test]
    fn test_message_events_are_deduplicated() {
        let mut graph = graph();
        let node = graph.add_node(int_source());
        graph.take_events();

        graph.add_node_message(node, "late input", NodeMessageSeverity::Warning);
        graph.add_node_message(node, "late input", NodeMessageSeverity::Warning);
        assert_eq!(graph.take_events().len(), 1);

        graph.remove_node_message(node, "late input");
        assert!(graph.node(node).unwrap().messages().is_empty());
        assert_eq!(
            graph.take_events(),
            vec![GraphEvent::MessageRemoved {
                node,
                text: "late input".to_string()
            }]
        );
    }
}
