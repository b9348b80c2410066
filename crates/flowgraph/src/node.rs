// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node model: typed units of computation with input/output port
//! collections, field value storage, lifecycle hooks and diagnostics.

use crate::edge::EdgeId;
use crate::port::{NodePort, PortDescriptor, PortDirection};
use crate::schema::NodeSchema;
use crate::subgraph::BoundaryBuffers;
use crate::value::{PortType, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Severity of a node diagnostic message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeMessageSeverity {
    /// No severity
    None,
    /// Informational
    Info,
    /// Warning
    Warning,
    /// Error
    Error,
}

/// A diagnostic message attached to a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMessage {
    /// Message text, unique per node
    pub text: String,
    /// Severity
    pub severity: NodeMessageSeverity,
}

/// Failure reported by a user-supplied node callback. Errors are logged and
/// recorded as node messages; they never abort graph evaluation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct NodeError(pub String);

impl From<String> for NodeError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for NodeError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Backing storage for a node's field values, addressed by field name and
/// optionally a nested member key inside a `Map` value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldValues {
    values: IndexMap<String, Value>,
}

impl FieldValues {
    /// Get a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Set a field value.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.values.insert(field.into(), value);
    }

    /// Get a value, resolving an optional nested member key inside the
    /// field's `Map` value.
    pub fn get_path(&self, field: &str, proxied: Option<&str>) -> Option<&Value> {
        let value = self.values.get(field)?;
        match proxied {
            None => Some(value),
            Some(key) => match value {
                Value::Map(map) => map.get(key),
                _ => None,
            },
        }
    }

    /// Set a value, resolving an optional nested member key. Setting a
    /// nested key on a non-`Map` field replaces it with a map.
    pub fn set_path(&mut self, field: &str, proxied: Option<&str>, value: Value) {
        match proxied {
            None => {
                self.values.insert(field.to_string(), value);
            }
            Some(key) => {
                let entry = self
                    .values
                    .entry(field.to_string())
                    .or_insert_with(|| Value::Map(IndexMap::new()));
                if !matches!(entry, Value::Map(_)) {
                    *entry = Value::Map(IndexMap::new());
                }
                if let Value::Map(map) = entry {
                    map.insert(key.to_string(), value);
                }
            }
        }
    }

    /// Iterate over all stored fields.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Raw map access for snapshots.
    pub(crate) fn as_map(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    /// Replace the whole storage (snapshot restore).
    pub(crate) fn replace(&mut self, values: IndexMap<String, Value>) {
        self.values = values;
    }
}

/// Snapshot of one edge connected to a field, visible to custom port
/// behaviors (e.g. a relay node deriving its own type from its neighbor).
#[derive(Debug, Clone)]
pub struct ConnectedEdge {
    /// The edge
    pub edge: EdgeId,
    /// The node on the other side
    pub remote_node: NodeId,
    /// Field behind the remote port
    pub remote_field: String,
    /// Identifier of the remote port
    pub remote_identifier: String,
    /// Display type of the remote port
    pub remote_type: PortType,
}

/// Context handed to custom port behaviors when (re)computing a field's
/// port set.
#[derive(Debug, Clone)]
pub struct BehaviorScope {
    /// The node being resynchronized
    pub node: NodeId,
    /// The field being resynchronized
    pub field: String,
    /// Edges currently connected to the field's ports
    pub edges: Vec<ConnectedEdge>,
    /// Current value of the backing field
    pub value: Option<Value>,
    /// Effective ingress descriptors of the owning graph's subgraph
    /// boundary, if any
    pub ingress_ports: Vec<PortDescriptor>,
    /// Effective egress descriptors of the owning graph's subgraph
    /// boundary, if any
    pub egress_ports: Vec<PortDescriptor>,
}

/// Context handed to lifecycle and processing hooks.
pub struct ProcessScope<'a> {
    /// The node being processed
    pub node: NodeId,
    /// The node's field values
    pub values: &'a mut FieldValues,
    /// Boundary buffers of the owning graph
    pub boundary: &'a mut BoundaryBuffers,
    pub(crate) pending_messages: Vec<(String, NodeMessageSeverity)>,
}

impl ProcessScope<'_> {
    /// Read an input field value.
    pub fn input(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Write an output field value.
    pub fn set_output(&mut self, field: impl Into<String>, value: Value) {
        self.values.set(field, value);
    }

    /// Attach a diagnostic message to the node (deduplicated by text).
    pub fn add_message(&mut self, text: impl Into<String>, severity: NodeMessageSeverity) {
        self.pending_messages.push((text.into(), severity));
    }
}

/// Scope for custom port I/O: the port being transferred, the pass-through
/// buffers of its connected edges (in aggregation order), the node's field
/// values and the owning graph's boundary buffers.
pub struct PortIo<'a> {
    /// The port being transferred
    pub port: &'a NodePort,
    /// Pass-through buffers of the connected edges, in aggregation order
    pub buffers: Vec<&'a mut Option<Value>>,
    /// The node's field values
    pub values: &'a mut FieldValues,
    /// Boundary buffers of the owning graph
    pub boundary: &'a mut BoundaryBuffers,
}

/// Behavior of a node type: processing callback, lifecycle hooks, and the
/// extension points for dynamically generated ports and custom value
/// transfer. Every hook has a no-op default.
pub trait NodeBehavior: Send {
    /// Called when the node is bound into a graph.
    fn on_enabled(&mut self) -> Result<(), NodeError> {
        Ok(())
    }

    /// Called when the node is unbound.
    fn on_disabled(&mut self) -> Result<(), NodeError> {
        Ok(())
    }

    /// Called when the node is removed from its graph.
    fn on_destroyed(&mut self) -> Result<(), NodeError> {
        Ok(())
    }

    /// Prepare the node before inputs are pulled.
    fn pre_process(&mut self, _scope: &mut ProcessScope<'_>) -> Result<(), NodeError> {
        Ok(())
    }

    /// Main processing callback, invoked after inputs were pulled.
    fn process(&mut self, _scope: &mut ProcessScope<'_>) -> Result<(), NodeError> {
        Ok(())
    }

    /// Called after outputs were pushed.
    fn post_process(&mut self, _scope: &mut ProcessScope<'_>) -> Result<(), NodeError> {
        Ok(())
    }

    /// Compute the desired port set for a custom-behavior field. Returning
    /// `None` means the behavior does not handle the field, which is a
    /// configuration error for fields declared `custom_behavior`.
    fn ports_for_field(&self, _field: &str, _scope: &BehaviorScope) -> Option<Vec<PortDescriptor>> {
        None
    }

    /// Whether this behavior computes port sets for plain fields of the
    /// given value type (type-keyed variant of `ports_for_field`).
    fn handles_type(&self, _value_type: &PortType) -> bool {
        false
    }

    /// Type-keyed port computation, applied to any field whose declared
    /// value type is claimed by [`NodeBehavior::handles_type`].
    fn ports_for_type(
        &self,
        _value_type: &PortType,
        _field: &str,
        _display_name: &str,
        _value: Option<&Value>,
    ) -> Option<Vec<PortDescriptor>> {
        None
    }

    /// Custom input transfer for a `custom_io` field: read the edge buffers
    /// and write into the backing field (or private state).
    fn pull(&mut self, _field: &str, _io: PortIo<'_>) -> Result<(), NodeError> {
        Ok(())
    }

    /// Custom output transfer for a `custom_io` field: write the edge
    /// buffers from the backing field (or private state).
    fn push(&mut self, _field: &str, _io: PortIo<'_>) -> Result<(), NodeError> {
        Ok(())
    }

    /// Whether the backing field of an input port may be reset to its
    /// type's zero-value when its last edge is disconnected.
    fn can_reset_port(&self, _field: &str) -> bool {
        true
    }
}

/// Behavior with no processing and no extension points, for pure data
/// nodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct InertBehavior;

impl NodeBehavior for InertBehavior {}

/// A node instance in a graph.
pub struct Node {
    /// Unique instance ID
    pub id: NodeId,
    /// Node type id (schema identity)
    pub type_id: String,
    schema: Arc<NodeSchema>,
    custom_name: Option<String>,
    /// Position on the canvas, used by spatial edge orderings and the view
    /// layer
    pub position: [f32; 2],
    /// Execution sequence index assigned by the processor; -1 before the
    /// first ordering
    pub compute_order: i32,
    /// Input ports, in schema/descriptor order
    pub input_ports: Vec<NodePort>,
    /// Output ports, in schema/descriptor order
    pub output_ports: Vec<NodePort>,
    /// Field value storage
    pub values: FieldValues,
    messages: Vec<NodeMessage>,
    pub(crate) behavior: Option<Box<dyn NodeBehavior>>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("type_id", &self.type_id)
            .field("custom_name", &self.custom_name)
            .field("compute_order", &self.compute_order)
            .field("input_ports", &self.input_ports)
            .field("output_ports", &self.output_ports)
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Create a node from its schema and behavior. Field values start at
    /// the authored defaults (or the type's zero-value). Ports are built
    /// when the node is added to a graph.
    pub fn new(schema: Arc<NodeSchema>, behavior: Box<dyn NodeBehavior>) -> Self {
        let mut values = FieldValues::default();
        for field in schema.fields.values() {
            let initial = field
                .default_value
                .clone()
                .unwrap_or_else(|| Value::default_of(&field.value_type));
            values.set(field.field_name.clone(), initial);
        }
        Self {
            id: NodeId::new(),
            type_id: schema.type_id.clone(),
            schema,
            custom_name: None,
            position: [0.0, 0.0],
            compute_order: -1,
            input_ports: Vec::new(),
            output_ports: Vec::new(),
            values,
            messages: Vec::new(),
            behavior: Some(behavior),
        }
    }

    /// Set the position
    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = [x, y];
        self
    }

    /// The node's schema.
    pub fn schema(&self) -> &Arc<NodeSchema> {
        &self.schema
    }

    /// Title shown for the node: the custom name when set, the schema title
    /// otherwise.
    pub fn title(&self) -> &str {
        self.custom_name.as_deref().unwrap_or(&self.schema.title)
    }

    /// The user-assigned custom name, if any.
    pub fn custom_name(&self) -> Option<&str> {
        self.custom_name.as_deref()
    }

    pub(crate) fn set_custom_name(&mut self, name: Option<String>) {
        self.custom_name = name;
    }

    /// Port container for a direction.
    pub fn ports(&self, direction: PortDirection) -> &[NodePort] {
        match direction {
            PortDirection::Input => &self.input_ports,
            PortDirection::Output => &self.output_ports,
        }
    }

    /// Mutable port container for a direction.
    pub fn ports_mut(&mut self, direction: PortDirection) -> &mut Vec<NodePort> {
        match direction {
            PortDirection::Input => &mut self.input_ports,
            PortDirection::Output => &mut self.output_ports,
        }
    }

    /// All ports of the node, inputs first.
    pub fn all_ports(&self) -> impl Iterator<Item = &NodePort> {
        self.input_ports.iter().chain(self.output_ports.iter())
    }

    /// All connected edge ids of the node.
    pub fn all_edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.all_ports().flat_map(|p| p.edges.iter().copied())
    }

    /// Get the port with an exact field name plus identifier match. An
    /// empty identifier only matches ports with an empty identifier, never
    /// acts as a wildcard.
    pub fn get_port(&self, field_name: &str, identifier: &str) -> Option<&NodePort> {
        self.all_ports().find(|p| p.matches(field_name, identifier))
    }

    /// Mutable variant of [`Node::get_port`].
    pub fn get_port_mut(&mut self, field_name: &str, identifier: &str) -> Option<&mut NodePort> {
        self.input_ports
            .iter_mut()
            .chain(self.output_ports.iter_mut())
            .find(|p| p.matches(field_name, identifier))
    }

    /// Whether the named field generates input ports.
    pub fn is_field_input(&self, field_name: &str) -> bool {
        self.schema.is_field_input(field_name)
    }

    /// Current diagnostic messages.
    pub fn messages(&self) -> &[NodeMessage] {
        &self.messages
    }

    /// Add a diagnostic message; duplicate text is a no-op. Returns whether
    /// the message was added.
    pub(crate) fn add_message(&mut self, text: String, severity: NodeMessageSeverity) -> bool {
        if self.messages.iter().any(|m| m.text == text) {
            return false;
        }
        self.messages.push(NodeMessage { text, severity });
        true
    }

    /// Remove a diagnostic message by exact text. Returns whether a message
    /// was removed.
    pub(crate) fn remove_message(&mut self, text: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.text != text);
        self.messages.len() != before
    }

    /// Remove all diagnostic messages, returning them.
    pub(crate) fn clear_messages(&mut self) -> Vec<NodeMessage> {
        std::mem::take(&mut self.messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PortType;

    fn sample_node() -> Node {
        let schema = NodeSchema::builder("test.sample", "Sample")
            .input("a", PortType::Int)
            .output("out", PortType::Int)
            .default_value(Value::Int(7))
            .build();
        Node::new(schema, Box::new(InertBehavior))
    }

    #[test]
    fn test_initial_values_from_schema() {
        let node = sample_node();
        assert_eq!(node.values.get("a"), Some(&Value::Int(0)));
        assert_eq!(node.values.get("out"), Some(&Value::Int(7)));
    }

    #[test]
    fn test_title_falls_back_to_schema() {
        let mut node = sample_node();
        assert_eq!(node.title(), "Sample");
        node.set_custom_name(Some("My node".to_string()));
        assert_eq!(node.title(), "My node");
    }

    #[test]
    fn test_get_port_empty_identifier_is_not_wildcard() {
        let mut node = sample_node();
        node.input_ports.push(NodePort::new(
            "a",
            PortDirection::Input,
            PortDescriptor::new("", PortType::Int),
        ));
        node.input_ports.push(NodePort::new(
            "a",
            PortDirection::Input,
            PortDescriptor::new("1", PortType::Int),
        ));

        assert_eq!(node.get_port("a", "").unwrap().descriptor.identifier, "");
        assert_eq!(node.get_port("a", "1").unwrap().descriptor.identifier, "1");
        assert!(node.get_port("a", "2").is_none());
    }

    #[test]
    fn test_message_dedup() {
        let mut node = sample_node();
        assert!(node.add_message("boom".to_string(), NodeMessageSeverity::Error));
        assert!(!node.add_message("boom".to_string(), NodeMessageSeverity::Error));
        assert_eq!(node.messages().len(), 1);
        assert!(node.remove_message("boom"));
        assert!(node.messages().is_empty());
    }

    #[test]
    fn test_field_values_nested_path() {
        let mut values = FieldValues::default();
        values.set_path("settings", Some("gain"), Value::Float(0.5));
        assert_eq!(
            values.get_path("settings", Some("gain")),
            Some(&Value::Float(0.5))
        );
        assert!(matches!(values.get("settings"), Some(Value::Map(_))));
    }
}
