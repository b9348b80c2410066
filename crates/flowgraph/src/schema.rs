// SPDX-License-Identifier: MIT OR Apache-2.0
//! Declarative node schemas: which fields generate ports, and how.
//!
//! A schema is built once per node type with the builder DSL and stored in
//! an explicit [`NodeTypeRegistry`]; declaration order is port order. This
//! replaces attribute scanning: declare once, ports appear automatically.

use crate::node::{Node, NodeBehavior};
use crate::port::{EdgeProcessOrder, PortDirection};
use crate::value::{PortType, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Declarative metadata for one port-bearing field of a node type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Name of the backing field
    pub field_name: String,
    /// Whether the field generates input or output ports
    pub direction: PortDirection,
    /// Display name used for generated ports
    pub display_name: String,
    /// Declared value type of the field. Multi-edge inputs declare the
    /// collection type; the generated port exposes the element type.
    pub value_type: PortType,
    /// Whether generated input ports accept multiple edges
    pub accept_multiple_edges: bool,
    /// Default aggregation order for multi-edge inputs
    pub edge_process_order: EdgeProcessOrder,
    /// Tooltip forwarded to generated ports
    pub tooltip: Option<String>,
    /// Editor hint: vertical port
    pub vertical: bool,
    /// Editor hint: show a property drawer (inputs only)
    pub show_as_drawer: bool,
    /// The port set is computed by the node behavior instead of being a
    /// single fixed port
    pub custom_behavior: bool,
    /// Value transfer goes through the behavior's pull/push hooks instead
    /// of the default copy
    pub custom_io: bool,
    /// The field's `Map` value is expanded into one port per entry
    pub nested: bool,
    /// Authored default value (falls back to the type's zero-value)
    pub default_value: Option<Value>,
}

/// Schema of a node type: identity, title, and its port-bearing fields in
/// declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSchema {
    /// Unique type identifier
    pub type_id: String,
    /// Default node title
    pub title: String,
    /// Port-bearing fields, in declaration order
    pub fields: IndexMap<String, FieldSchema>,
    /// Whether nodes of this type can be removed from a graph
    pub deletable: bool,
    /// Whether nodes of this type can be renamed
    pub renamable: bool,
}

impl NodeSchema {
    /// Start building a schema.
    pub fn builder(type_id: impl Into<String>, title: impl Into<String>) -> NodeSchemaBuilder {
        NodeSchemaBuilder {
            schema: NodeSchema {
                type_id: type_id.into(),
                title: title.into(),
                fields: IndexMap::new(),
                deletable: true,
                renamable: true,
            },
            last_field: None,
        }
    }

    /// Get a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.get(name)
    }

    /// Whether the named field generates input ports.
    pub fn is_field_input(&self, name: &str) -> bool {
        self.fields
            .get(name)
            .is_some_and(|f| f.direction == PortDirection::Input)
    }
}

/// Builder for [`NodeSchema`]. Field modifiers apply to the last declared
/// field; a modifier called before any field is ignored with a warning.
pub struct NodeSchemaBuilder {
    schema: NodeSchema,
    last_field: Option<String>,
}

impl NodeSchemaBuilder {
    fn push_field(&mut self, field: FieldSchema) {
        self.last_field = Some(field.field_name.clone());
        self.schema.fields.insert(field.field_name.clone(), field);
    }

    fn field(name: impl Into<String>, direction: PortDirection, value_type: PortType) -> FieldSchema {
        let field_name = name.into();
        FieldSchema {
            display_name: field_name.clone(),
            field_name,
            direction,
            value_type,
            accept_multiple_edges: direction == PortDirection::Output,
            edge_process_order: EdgeProcessOrder::default(),
            tooltip: None,
            vertical: false,
            show_as_drawer: false,
            custom_behavior: false,
            custom_io: false,
            nested: false,
            default_value: None,
        }
    }

    /// Declare an input field with a single port of the given type.
    pub fn input(mut self, name: impl Into<String>, value_type: PortType) -> Self {
        self.push_field(Self::field(name, PortDirection::Input, value_type));
        self
    }

    /// Declare a multi-edge input backed by a collection of the given
    /// element type; the port exposes the element type.
    pub fn multi_input(
        mut self,
        name: impl Into<String>,
        element_type: PortType,
        order: EdgeProcessOrder,
    ) -> Self {
        let mut field = Self::field(
            name,
            PortDirection::Input,
            PortType::List(Box::new(element_type)),
        );
        field.accept_multiple_edges = true;
        field.edge_process_order = order;
        self.push_field(field);
        self
    }

    /// Declare an output field with a single port of the given type.
    pub fn output(mut self, name: impl Into<String>, value_type: PortType) -> Self {
        self.push_field(Self::field(name, PortDirection::Output, value_type));
        self
    }

    /// Declare an input field whose port set is computed by the behavior's
    /// `ports_for_field`.
    pub fn custom_input(mut self, name: impl Into<String>) -> Self {
        let mut field = Self::field(name, PortDirection::Input, PortType::Any);
        field.custom_behavior = true;
        self.push_field(field);
        self
    }

    /// Declare an output field whose port set is computed by the behavior's
    /// `ports_for_field`.
    pub fn custom_output(mut self, name: impl Into<String>) -> Self {
        let mut field = Self::field(name, PortDirection::Output, PortType::Any);
        field.custom_behavior = true;
        self.push_field(field);
        self
    }

    /// Declare an input whose `Map` value is expanded into one port per
    /// entry (nested port group).
    pub fn nested_input(mut self, name: impl Into<String>) -> Self {
        let mut field = Self::field(name, PortDirection::Input, PortType::Map);
        field.nested = true;
        self.push_field(field);
        self
    }

    fn last_mut(&mut self) -> Option<&mut FieldSchema> {
        let Some(name) = self.last_field.as_ref() else {
            tracing::warn!(
                "field modifier on schema {} called before any field was declared; ignoring",
                self.schema.type_id
            );
            return None;
        };
        self.schema.fields.get_mut(name)
    }

    /// Set the display name of the last declared field.
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        if let Some(field) = self.last_mut() {
            field.display_name = name.into();
        }
        self
    }

    /// Route the last declared field's value transfer through the
    /// behavior's pull/push hooks.
    pub fn custom_io(mut self) -> Self {
        if let Some(field) = self.last_mut() {
            field.custom_io = true;
        }
        self
    }

    /// Set the tooltip of the last declared field.
    pub fn tooltip(mut self, tooltip: impl Into<String>) -> Self {
        if let Some(field) = self.last_mut() {
            field.tooltip = Some(tooltip.into());
        }
        self
    }

    /// Mark the last declared field as vertical (editor hint).
    pub fn vertical(mut self) -> Self {
        if let Some(field) = self.last_mut() {
            field.vertical = true;
        }
        self
    }

    /// Show a property drawer for the last declared field (editor hint).
    pub fn drawer(mut self) -> Self {
        if let Some(field) = self.last_mut() {
            field.show_as_drawer = true;
        }
        self
    }

    /// Set the authored default value of the last declared field.
    pub fn default_value(mut self, value: Value) -> Self {
        if let Some(field) = self.last_mut() {
            field.default_value = Some(value);
        }
        self
    }

    /// Forbid removing nodes of this type from a graph.
    pub fn not_deletable(mut self) -> Self {
        self.schema.deletable = false;
        self
    }

    /// Forbid renaming nodes of this type.
    pub fn not_renamable(mut self) -> Self {
        self.schema.renamable = false;
        self
    }

    /// Finish building.
    pub fn build(self) -> Arc<NodeSchema> {
        Arc::new(self.schema)
    }
}

/// Factory producing a fresh behavior for a node type.
pub type BehaviorFactory = Arc<dyn Fn() -> Box<dyn NodeBehavior> + Send + Sync>;

/// Registry of node types: schema plus behavior factory, keyed by type id.
///
/// Constructed once at startup and passed by reference to whatever needs
/// it; there is no ambient static registry.
#[derive(Default)]
pub struct NodeTypeRegistry {
    types: IndexMap<String, NodeTypeEntry>,
}

struct NodeTypeEntry {
    schema: Arc<NodeSchema>,
    factory: BehaviorFactory,
}

impl NodeTypeRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node type.
    pub fn register<F>(&mut self, schema: Arc<NodeSchema>, factory: F)
    where
        F: Fn() -> Box<dyn NodeBehavior> + Send + Sync + 'static,
    {
        self.types.insert(
            schema.type_id.clone(),
            NodeTypeEntry {
                schema,
                factory: Arc::new(factory),
            },
        );
    }

    /// Get a schema by type id.
    pub fn schema(&self, type_id: &str) -> Option<&Arc<NodeSchema>> {
        self.types.get(type_id).map(|e| &e.schema)
    }

    /// All registered type ids, in registration order.
    pub fn type_ids(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Create an uninitialized node of the given type. Returns `None` for
    /// unknown type ids.
    pub fn instantiate(&self, type_id: &str) -> Option<Node> {
        let entry = self.types.get(type_id)?;
        Some(Node::new(Arc::clone(&entry.schema), (entry.factory)()))
    }
}

impl std::fmt::Debug for NodeTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeTypeRegistry")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_declaration_order_and_flags() {
        let schema = NodeSchema::builder("math.add", "Add")
            .input("a", PortType::Int)
            .input("b", PortType::Int)
            .tooltip("right operand")
            .output("sum", PortType::Int)
            .build();

        let names: Vec<&str> = schema.fields.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["a", "b", "sum"]);
        assert_eq!(schema.field("b").unwrap().tooltip.as_deref(), Some("right operand"));
        assert!(schema.is_field_input("a"));
        assert!(!schema.is_field_input("sum"));
    }

    #[test]
    fn test_field_modifier_before_any_field_is_ignored() {
        let schema = NodeSchema::builder("test.empty", "Empty")
            .tooltip("nowhere to go")
            .build();
        assert!(schema.fields.is_empty());
    }

    #[test]
    fn test_multi_input_declares_collection_type() {
        let schema = NodeSchema::builder("t", "T")
            .multi_input("values", PortType::Int, EdgeProcessOrder::Lifo)
            .build();
        let field = schema.field("values").unwrap();
        assert_eq!(field.value_type, PortType::List(Box::new(PortType::Int)));
        assert!(field.accept_multiple_edges);
        assert_eq!(field.edge_process_order, EdgeProcessOrder::Lifo);
    }
}
