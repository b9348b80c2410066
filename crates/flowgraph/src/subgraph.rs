// SPDX-License-Identifier: MIT OR Apache-2.0
//! Subgraphs: a graph embedded as a single node of a parent graph.
//!
//! The boundary is a pair of special nodes inside the body graph. The
//! ingress node exposes one output port per ingress descriptor and feeds
//! the body from the parent's input values; the egress node collects body
//! values for the parent's output ports. Macros are subgraphs whose
//! boundary descriptors live in a schema shared across instances.

use crate::graph::Graph;
use crate::node::{BehaviorScope, Node, NodeBehavior, NodeError, NodeId, PortIo};
use crate::port::PortDescriptor;
use crate::processor::Processor;
use crate::schema::{NodeSchema, NodeTypeRegistry};
use crate::value::Value;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Node type id of the ingress boundary node
pub const INGRESS_NODE_TYPE: &str = "subgraph.ingress";
/// Node type id of the egress boundary node
pub const EGRESS_NODE_TYPE: &str = "subgraph.egress";

/// Field of the ingress node carrying its generated output ports
const INGRESS_FIELD: &str = "outputs";
/// Field of the egress node carrying its generated input ports
const EGRESS_FIELD: &str = "inputs";

/// Value buffers crossing a subgraph boundary, homed on the body graph.
/// Ingress values are seeded by the embedding node before a pass; egress
/// values are collected during it.
#[derive(Debug, Clone, Default)]
pub struct BoundaryBuffers {
    /// Values entering the body, keyed by ingress port identifier
    pub ingress: IndexMap<String, Value>,
    /// Values leaving the body, keyed by egress port identifier
    pub egress: IndexMap<String, Value>,
}

/// Boundary port descriptors shared between subgraph instances (macros).
/// Mutations bump a revision counter; instances resynchronize lazily by
/// comparing revisions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubGraphPortSchema {
    ingress: Vec<PortDescriptor>,
    egress: Vec<PortDescriptor>,
    revision: u64,
}

impl SubGraphPortSchema {
    /// Shared ingress descriptors.
    pub fn ingress(&self) -> &[PortDescriptor] {
        &self.ingress
    }

    /// Shared egress descriptors.
    pub fn egress(&self) -> &[PortDescriptor] {
        &self.egress
    }

    /// Current revision; bumped on every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Add an ingress descriptor.
    pub fn add_ingress(&mut self, descriptor: PortDescriptor) {
        self.ingress.push(descriptor);
        self.revision += 1;
    }

    /// Add an egress descriptor.
    pub fn add_egress(&mut self, descriptor: PortDescriptor) {
        self.egress.push(descriptor);
        self.revision += 1;
    }

    /// Remove an ingress descriptor by identifier.
    pub fn remove_ingress(&mut self, identifier: &str) {
        self.ingress.retain(|d| d.identifier != identifier);
        self.revision += 1;
    }

    /// Remove an egress descriptor by identifier.
    pub fn remove_egress(&mut self, identifier: &str) {
        self.egress.retain(|d| d.identifier != identifier);
        self.revision += 1;
    }
}

/// Handle to a port schema shared by every instance of one macro.
pub type SharedPortSchema = Arc<RwLock<SubGraphPortSchema>>;

/// Boundary state of a graph used as a subgraph body: the optional shared
/// schema plus descriptors local to this instance.
#[derive(Debug, Default)]
pub struct SubGraphBoundary {
    schema: Option<SharedPortSchema>,
    local_ingress: Vec<PortDescriptor>,
    local_egress: Vec<PortDescriptor>,
    seen_revision: u64,
}

/// Schema of the ingress boundary node.
pub fn ingress_node_schema() -> Arc<NodeSchema> {
    NodeSchema::builder(INGRESS_NODE_TYPE, "Ingress")
        .custom_output(INGRESS_FIELD)
        .custom_io()
        .not_deletable()
        .not_renamable()
        .build()
}

/// Schema of the egress boundary node.
pub fn egress_node_schema() -> Arc<NodeSchema> {
    NodeSchema::builder(EGRESS_NODE_TYPE, "Egress")
        .custom_input(EGRESS_FIELD)
        .custom_io()
        .not_deletable()
        .not_renamable()
        .build()
}

/// Register the boundary node types; snapshot restore instantiates them by
/// type id like any other node.
pub fn register_boundary_types(registry: &mut NodeTypeRegistry) {
    registry.register(ingress_node_schema(), || Box::new(SubGraphIngressBehavior));
    registry.register(egress_node_schema(), || Box::new(SubGraphEgressBehavior));
}

/// Create a graph set up as a subgraph body: boundary state installed and
/// the two boundary nodes added. Pass a shared schema to make the body a
/// macro instance.
pub fn new_subgraph(
    name: impl Into<String>,
    adapters: Arc<crate::adapter::TypeAdapterRegistry>,
    schema: Option<SharedPortSchema>,
) -> Graph {
    let mut graph = Graph::new(name, adapters);
    let seen_revision = schema.as_ref().map_or(0, |s| s.read().revision);
    graph.boundary = Some(SubGraphBoundary {
        schema,
        local_ingress: Vec::new(),
        local_egress: Vec::new(),
        seen_revision,
    });
    graph.add_node(Node::new(ingress_node_schema(), Box::new(SubGraphIngressBehavior)));
    graph.add_node(Node::new(egress_node_schema(), Box::new(SubGraphEgressBehavior)));
    graph
}

impl Graph {
    /// Whether this graph carries a subgraph boundary.
    pub fn is_subgraph(&self) -> bool {
        self.boundary.is_some()
    }

    /// Effective ingress descriptors: the shared schema's (when present)
    /// followed by this instance's local ones. Empty without a boundary.
    pub fn ingress_port_data(&self) -> Vec<PortDescriptor> {
        let Some(boundary) = &self.boundary else {
            return Vec::new();
        };
        let mut out = boundary
            .schema
            .as_ref()
            .map(|s| s.read().ingress.clone())
            .unwrap_or_default();
        out.extend(boundary.local_ingress.iter().cloned());
        out
    }

    /// Effective egress descriptors, shared schema first.
    pub fn egress_port_data(&self) -> Vec<PortDescriptor> {
        let Some(boundary) = &self.boundary else {
            return Vec::new();
        };
        let mut out = boundary
            .schema
            .as_ref()
            .map(|s| s.read().egress.clone())
            .unwrap_or_default();
        out.extend(boundary.local_egress.iter().cloned());
        out
    }

    /// The ingress boundary node, if this graph is a subgraph body.
    pub fn ingress_node(&self) -> Option<NodeId> {
        self.nodes()
            .find(|n| n.type_id == INGRESS_NODE_TYPE)
            .map(|n| n.id)
    }

    /// The egress boundary node, if this graph is a subgraph body.
    pub fn egress_node(&self) -> Option<NodeId> {
        self.nodes()
            .find(|n| n.type_id == EGRESS_NODE_TYPE)
            .map(|n| n.id)
    }

    /// Add an instance-local ingress port and resynchronize the boundary
    /// nodes. Ignored (with a warning) on graphs without a boundary.
    pub fn add_ingress_port(&mut self, descriptor: PortDescriptor) {
        let Some(boundary) = &mut self.boundary else {
            tracing::warn!("add_ingress_port on a graph without a subgraph boundary");
            return;
        };
        boundary.local_ingress.push(descriptor);
        self.resync_boundary_nodes();
    }

    /// Add an instance-local egress port and resynchronize the boundary
    /// nodes.
    pub fn add_egress_port(&mut self, descriptor: PortDescriptor) {
        let Some(boundary) = &mut self.boundary else {
            tracing::warn!("add_egress_port on a graph without a subgraph boundary");
            return;
        };
        boundary.local_egress.push(descriptor);
        self.resync_boundary_nodes();
    }

    /// Remove an instance-local boundary port by identifier and
    /// resynchronize.
    pub fn remove_local_boundary_port(&mut self, identifier: &str) {
        let Some(boundary) = &mut self.boundary else {
            return;
        };
        boundary.local_ingress.retain(|d| d.identifier != identifier);
        boundary.local_egress.retain(|d| d.identifier != identifier);
        self.resync_boundary_nodes();
    }

    /// Pick up shared-schema changes made since the last synchronization.
    /// Returns whether the boundary nodes were resynchronized.
    pub fn sync_boundary_ports(&mut self) -> bool {
        let Some(boundary) = &mut self.boundary else {
            return false;
        };
        let Some(schema) = &boundary.schema else {
            return false;
        };
        let revision = schema.read().revision;
        if revision == boundary.seen_revision {
            return false;
        }
        boundary.seen_revision = revision;
        self.resync_boundary_nodes();
        true
    }

    fn resync_boundary_nodes(&mut self) {
        let boundary_nodes: Vec<NodeId> = self
            .nodes()
            .filter(|n| n.type_id == INGRESS_NODE_TYPE || n.type_id == EGRESS_NODE_TYPE)
            .map(|n| n.id)
            .collect();
        for node in boundary_nodes {
            crate::binding::update_all_ports(self, node);
        }
    }
}

/// Behavior of the ingress boundary node: one output port per ingress
/// descriptor, fed from the body graph's ingress buffers.
pub struct SubGraphIngressBehavior;

impl NodeBehavior for SubGraphIngressBehavior {
    fn ports_for_field(&self, field: &str, scope: &BehaviorScope) -> Option<Vec<PortDescriptor>> {
        (field == INGRESS_FIELD).then(|| scope.ingress_ports.clone())
    }

    fn push(&mut self, _field: &str, io: PortIo<'_>) -> Result<(), NodeError> {
        let value = io.boundary.ingress.get(&io.port.descriptor.identifier).cloned();
        for buffer in io.buffers {
            *buffer = value.clone();
        }
        Ok(())
    }

    fn post_process(
        &mut self,
        scope: &mut crate::node::ProcessScope<'_>,
    ) -> Result<(), NodeError> {
        scope.boundary.ingress.clear();
        Ok(())
    }
}

/// Behavior of the egress boundary node: one input port per egress
/// descriptor, collecting body values into the egress buffers.
pub struct SubGraphEgressBehavior;

impl NodeBehavior for SubGraphEgressBehavior {
    fn ports_for_field(&self, field: &str, scope: &BehaviorScope) -> Option<Vec<PortDescriptor>> {
        (field == EGRESS_FIELD).then(|| scope.egress_ports.clone())
    }

    fn pre_process(&mut self, scope: &mut crate::node::ProcessScope<'_>) -> Result<(), NodeError> {
        scope.boundary.egress.clear();
        Ok(())
    }

    fn pull(&mut self, _field: &str, io: PortIo<'_>) -> Result<(), NodeError> {
        if let Some(value) = io.buffers.into_iter().next().and_then(|b| b.clone()) {
            io.boundary
                .egress
                .insert(io.port.descriptor.identifier.clone(), value);
        }
        Ok(())
    }
}

/// Behavior of a node embedding a subgraph body in a parent graph. Its
/// input ports mirror the body's ingress descriptors, its output ports the
/// egress descriptors; processing runs one pass over the body.
pub struct SubGraphNodeBehavior {
    body: Graph,
    pass_through: IndexMap<String, Value>,
    egress_out: IndexMap<String, Value>,
}

impl SubGraphNodeBehavior {
    /// Embed the given subgraph body.
    pub fn new(body: Graph) -> Self {
        Self {
            body,
            pass_through: IndexMap::new(),
            egress_out: IndexMap::new(),
        }
    }

    /// The embedded body graph.
    pub fn body(&self) -> &Graph {
        &self.body
    }

    /// Mutable access to the embedded body graph.
    pub fn body_mut(&mut self) -> &mut Graph {
        &mut self.body
    }
}

/// Schema for a node embedding a subgraph.
pub fn subgraph_node_schema(type_id: impl Into<String>, title: impl Into<String>) -> Arc<NodeSchema> {
    NodeSchema::builder(type_id, title)
        .custom_input("inputs")
        .custom_io()
        .custom_output("outputs")
        .custom_io()
        .build()
}

impl NodeBehavior for SubGraphNodeBehavior {
    fn ports_for_field(&self, field: &str, _scope: &BehaviorScope) -> Option<Vec<PortDescriptor>> {
        match field {
            "inputs" => Some(self.body.ingress_port_data()),
            "outputs" => Some(self.body.egress_port_data()),
            _ => None,
        }
    }

    fn pull(&mut self, _field: &str, io: PortIo<'_>) -> Result<(), NodeError> {
        if let Some(value) = io.buffers.into_iter().next().and_then(|b| b.clone()) {
            self.pass_through
                .insert(io.port.descriptor.identifier.clone(), value);
        }
        Ok(())
    }

    fn process(&mut self, _scope: &mut crate::node::ProcessScope<'_>) -> Result<(), NodeError> {
        self.body.sync_boundary_ports();
        let processor = Processor::new(&mut self.body)
            .map_err(|_| NodeError::from("subgraph body contains a cycle"))?;
        processor.run_with_ingress(&mut self.body, std::mem::take(&mut self.pass_through));
        self.egress_out = self.body.boundary_buffers().egress.clone();
        Ok(())
    }

    fn push(&mut self, _field: &str, io: PortIo<'_>) -> Result<(), NodeError> {
        let value = self.egress_out.get(&io.port.descriptor.identifier).cloned();
        for buffer in io.buffers {
            *buffer = value.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::TypeAdapterRegistry;
    use crate::node::InertBehavior;
    use crate::value::PortType;

    fn adapters() -> Arc<TypeAdapterRegistry> {
        Arc::new(TypeAdapterRegistry::new())
    }

    fn passthrough_body(adapters: &Arc<TypeAdapterRegistry>) -> Graph {
        let mut body = new_subgraph("body", Arc::clone(adapters), None);
        body.add_ingress_port(PortDescriptor::new("v", PortType::Int));
        body.add_egress_port(PortDescriptor::new("v", PortType::Int));
        let ingress = body.ingress_node().unwrap();
        let egress = body.egress_node().unwrap();
        body.connect(ingress, ("outputs", "v"), egress, ("inputs", "v"))
            .unwrap();
        body
    }

    #[test]
    fn test_boundary_ports_appear_on_boundary_nodes() {
        let adapters = adapters();
        let body = passthrough_body(&adapters);
        let ingress = body.node(body.ingress_node().unwrap()).unwrap();
        assert_eq!(ingress.output_ports.len(), 1);
        assert_eq!(ingress.output_ports[0].descriptor.identifier, "v");
        let egress = body.node(body.egress_node().unwrap()).unwrap();
        assert_eq!(egress.input_ports.len(), 1);
    }

    #[test]
    fn test_value_round_trips_through_a_subgraph() {
        let adapters = adapters();
        let body = passthrough_body(&adapters);

        let mut parent = Graph::new("parent", Arc::clone(&adapters));
        let source_schema = NodeSchema::builder("test.source", "Source")
            .output("out", PortType::Int)
            .build();
        let source = parent.add_node(Node::new(source_schema, Box::new(InertBehavior)));
        parent.node_mut(source).unwrap().values.set("out", Value::Int(42));

        let sub = parent.add_node(Node::new(
            subgraph_node_schema("test.sub", "Sub"),
            Box::new(SubGraphNodeBehavior::new(body)),
        ));

        let sink_schema = NodeSchema::builder("test.sink", "Sink")
            .input("x", PortType::Int)
            .build();
        let sink = parent.add_node(Node::new(sink_schema, Box::new(InertBehavior)));

        parent.connect(source, ("out", ""), sub, ("inputs", "v")).unwrap();
        parent.connect(sub, ("outputs", "v"), sink, ("x", "")).unwrap();

        let processor = Processor::new(&mut parent).unwrap();
        processor.run(&mut parent);

        assert_eq!(parent.node(sink).unwrap().values.get("x"), Some(&Value::Int(42)));
    }

    #[test]
    fn test_shared_schema_changes_are_picked_up_by_revision() {
        let adapters = adapters();
        let shared: SharedPortSchema = Arc::new(RwLock::new(SubGraphPortSchema::default()));
        let mut body = new_subgraph("macro body", Arc::clone(&adapters), Some(shared.clone()));
        assert_eq!(body.node(body.ingress_node().unwrap()).unwrap().output_ports.len(), 0);

        shared.write().add_ingress(PortDescriptor::new("in", PortType::Float));
        assert!(body.sync_boundary_ports());
        assert!(!body.sync_boundary_ports());
        assert_eq!(body.node(body.ingress_node().unwrap()).unwrap().output_ports.len(), 1);
    }
}
