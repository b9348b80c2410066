// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port descriptors and runtime ports.

use crate::edge::EdgeId;
use crate::value::PortType;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Port direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortDirection {
    /// Input port
    Input,
    /// Output port
    Output,
}

/// Order in which the edges of a multi-edge input are aggregated.
///
/// The spatial variants sort edges by the producing node's canvas position,
/// giving a deterministic, user-controllable order when several producers
/// feed one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EdgeProcessOrder {
    /// Connection order
    #[default]
    Fifo,
    /// Reverse connection order
    Lifo,
    /// Producing node position, top to bottom
    TopToBottom,
    /// Producing node position, bottom to top
    BottomToTop,
    /// Producing node position, left to right
    LeftToRight,
    /// Producing node position, right to left
    RightToLeft,
}

/// Pure value describing one connection point on a node.
///
/// Two descriptors are interchangeable for diffing iff their identifiers
/// match; the port-resync algorithm keys everything on `identifier`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDescriptor {
    /// Unique identifier among the ports generated for the same field.
    /// Plain (non custom-behavior) fields use the empty string.
    pub identifier: String,
    /// Display name on the node
    pub display_name: String,
    /// The logical value type flowing through the port
    pub display_type: PortType,
    /// Whether the port accepts multiple connected edges
    pub accept_multiple_edges: bool,
    /// Order in which connected edges are aggregated
    pub edge_process_order: EdgeProcessOrder,
    /// Editor hint: show a property drawer next to the port (inputs only)
    pub show_as_drawer: bool,
    /// Editor hint: vertical port
    pub vertical: bool,
    /// Tooltip of the port
    pub tooltip: Option<String>,
    /// Inner member addressed by this port when it proxies an entry of a
    /// nested port group
    pub proxied_field: Option<String>,
}

impl PortDescriptor {
    /// Create a descriptor with the given identifier and type; the display
    /// name defaults to the identifier.
    pub fn new(identifier: impl Into<String>, display_type: PortType) -> Self {
        let identifier = identifier.into();
        Self {
            display_name: identifier.clone(),
            identifier,
            display_type,
            accept_multiple_edges: false,
            edge_process_order: EdgeProcessOrder::default(),
            show_as_drawer: false,
            vertical: false,
            tooltip: None,
            proxied_field: None,
        }
    }

    /// Set the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Allow multiple connected edges.
    pub fn with_multiple_edges(mut self) -> Self {
        self.accept_multiple_edges = true;
        self
    }

    /// Set the edge aggregation order.
    pub fn with_edge_process_order(mut self, order: EdgeProcessOrder) -> Self {
        self.edge_process_order = order;
        self
    }

    /// Set the tooltip.
    pub fn with_tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = Some(tooltip.into());
        self
    }

    /// Copy every field from `other`, including the identifier: a custom
    /// behavior may rename an existing port in place without tearing down
    /// its edges.
    pub fn copy_from(&mut self, other: &PortDescriptor) {
        self.identifier = other.identifier.clone();
        self.display_name = other.display_name.clone();
        self.display_type = other.display_type.clone();
        self.accept_multiple_edges = other.accept_multiple_edges;
        self.edge_process_order = other.edge_process_order;
        self.show_as_drawer = other.show_as_drawer;
        self.vertical = other.vertical;
        self.tooltip = other.tooltip.clone();
        self.proxied_field = other.proxied_field.clone();
    }
}

// Hash over the identifier only: the identifier is the primary diffing key,
// while equality stays structural over all fields.
impl Hash for PortDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
    }
}

/// Runtime port on a node: the descriptor plus the backing field name and
/// the edges currently connected. Edge payloads live in the graph; a port
/// only tracks ids, in connection order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePort {
    /// Name of the schema field behind this port
    pub field_name: String,
    /// Port direction
    pub direction: PortDirection,
    /// Data of the port
    pub descriptor: PortDescriptor,
    /// Connected edges, in connection order
    pub edges: Vec<EdgeId>,
}

impl NodePort {
    /// Create a new unconnected port.
    pub fn new(
        field_name: impl Into<String>,
        direction: PortDirection,
        descriptor: PortDescriptor,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            direction,
            descriptor,
            edges: Vec::new(),
        }
    }

    /// Whether this is an input accepting multiple edges.
    pub fn is_multi_edge_input(&self) -> bool {
        self.direction == PortDirection::Input && self.descriptor.accept_multiple_edges
    }

    /// Register a connected edge. Duplicate registration is a no-op.
    pub fn add_edge(&mut self, edge: EdgeId) {
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
    }

    /// Unregister a connected edge.
    pub fn remove_edge(&mut self, edge: &EdgeId) {
        self.edges.retain(|e| e != edge);
    }

    /// Whether the port identifier matches, treating empty as equal to
    /// empty (never as a wildcard).
    pub fn matches(&self, field_name: &str, identifier: &str) -> bool {
        self.field_name == field_name && self.descriptor.identifier == identifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_equality_is_structural() {
        let a = PortDescriptor::new("x", PortType::Int);
        let mut b = PortDescriptor::new("x", PortType::Int);
        assert_eq!(a, b);
        b.display_name = "other".to_string();
        assert_ne!(a, b);
    }

    #[test]
    fn test_copy_from_adopts_identifier() {
        let mut old = PortDescriptor::new("a", PortType::Int);
        let renamed = PortDescriptor::new("b", PortType::Float).with_tooltip("t");
        old.copy_from(&renamed);
        assert_eq!(old, renamed);
        assert_eq!(old.identifier, "b");
    }

    #[test]
    fn test_port_edge_registration_dedups() {
        let mut port = NodePort::new(
            "f",
            PortDirection::Input,
            PortDescriptor::new("", PortType::Int),
        );
        let id = EdgeId::new();
        port.add_edge(id);
        port.add_edge(id);
        assert_eq!(port.edges.len(), 1);
        port.remove_edge(&id);
        assert!(port.edges.is_empty());
    }
}
