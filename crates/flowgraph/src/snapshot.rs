// SPDX-License-Identifier: MIT OR Apache-2.0
//! Plain-data snapshots of a graph, serialized as RON.
//!
//! A snapshot stores node identity, type ids, positions and field values,
//! plus edges by endpoint address. Behaviors are not serialized: restore
//! instantiates every node from a [`NodeTypeRegistry`] by type id and
//! re-resolves edges against the rebuilt ports.

use crate::adapter::TypeAdapterRegistry;
use crate::edge::Edge;
use crate::graph::Graph;
use crate::node::NodeId;
use crate::schema::NodeTypeRegistry;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Error when capturing or restoring a snapshot
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// A node's type id is not present in the registry
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    /// Snapshot text could not be parsed
    #[error("snapshot parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Snapshot could not be serialized
    #[error("snapshot serialize error: {0}")]
    Serialize(#[from] ron::Error),
}

/// Serialized state of one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Node instance id
    pub id: NodeId,
    /// Node type id, resolved against the registry on restore
    pub type_id: String,
    /// User-assigned name, if any
    pub custom_name: Option<String>,
    /// Canvas position
    pub position: [f32; 2],
    /// Field values by field name
    pub values: IndexMap<String, Value>,
}

/// Serialized state of a whole graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Graph name
    pub name: String,
    /// Nodes, in insertion order
    pub nodes: Vec<NodeSnapshot>,
    /// Edges, in insertion order
    pub edges: Vec<Edge>,
}

impl GraphSnapshot {
    /// Capture the current state of a graph.
    pub fn capture(graph: &Graph) -> Self {
        Self {
            name: graph.name.clone(),
            nodes: graph
                .nodes()
                .map(|node| NodeSnapshot {
                    id: node.id,
                    type_id: node.type_id.clone(),
                    custom_name: node.custom_name().map(str::to_string),
                    position: node.position,
                    values: node.values.as_map().clone(),
                })
                .collect(),
            edges: graph.edges().cloned().collect(),
        }
    }

    /// Rebuild a live graph: instantiate every node from the registry,
    /// restore its identity and values, then reconnect the edges. Edges
    /// whose endpoints no longer resolve are skipped with an error log.
    pub fn restore(
        &self,
        registry: &NodeTypeRegistry,
        adapters: Arc<TypeAdapterRegistry>,
    ) -> Result<Graph, SnapshotError> {
        let mut graph = Graph::new(self.name.clone(), adapters);

        for snap in &self.nodes {
            let mut node = registry
                .instantiate(&snap.type_id)
                .ok_or_else(|| SnapshotError::UnknownNodeType(snap.type_id.clone()))?;
            node.id = snap.id;
            node.set_custom_name(snap.custom_name.clone());
            node.position = snap.position;
            node.values.replace(snap.values.clone());
            graph.add_node(node);
        }

        for edge in &self.edges {
            let result = graph.connect_with_id(
                edge.id,
                edge.output_node,
                (&edge.output_field, &edge.output_identifier),
                edge.input_node,
                (&edge.input_field, &edge.input_identifier),
            );
            if let Err(err) = result {
                tracing::error!("skipping unresolvable edge {:?}: {}", edge.id, err);
            }
        }

        Ok(graph)
    }

    /// Serialize to RON text.
    pub fn to_ron(&self) -> Result<String, SnapshotError> {
        let config = ron::ser::PrettyConfig::default().struct_names(true);
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Parse from RON text.
    pub fn from_ron(text: &str) -> Result<Self, SnapshotError> {
        Ok(ron::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{InertBehavior, Node, NodeBehavior, NodeError, ProcessScope};
    use crate::schema::NodeSchema;
    use crate::value::PortType;

    struct Negate;

    impl NodeBehavior for Negate {
        fn process(&mut self, scope: &mut ProcessScope<'_>) -> Result<(), NodeError> {
            let x = match scope.input("x") {
                Some(Value::Int(i)) => *i,
                _ => 0,
            };
            scope.set_output("out", Value::Int(-x));
            Ok(())
        }
    }

    fn registry() -> NodeTypeRegistry {
        let mut registry = NodeTypeRegistry::new();
        registry.register(
            NodeSchema::builder("test.negate", "Negate")
                .input("x", PortType::Int)
                .output("out", PortType::Int)
                .build(),
            || Box::new(Negate),
        );
        registry.register(
            NodeSchema::builder("test.constant", "Constant")
                .output("out", PortType::Int)
                .build(),
            || Box::new(InertBehavior),
        );
        registry
    }

    #[test]
    fn test_round_trip_preserves_structure_and_values() {
        let registry = registry();
        let adapters = Arc::new(TypeAdapterRegistry::new());
        let mut graph = Graph::new("demo", Arc::clone(&adapters));

        let constant = graph.add_node(
            registry.instantiate("test.constant").unwrap().with_position(10.0, 20.0),
        );
        graph.node_mut(constant).unwrap().values.set("out", Value::Int(5));
        graph.set_node_custom_name(constant, Some("five".to_string()));
        let negate = graph.add_node(registry.instantiate("test.negate").unwrap());
        let edge = graph
            .connect(constant, ("out", ""), negate, ("x", ""))
            .unwrap();

        let text = GraphSnapshot::capture(&graph).to_ron().unwrap();
        let mut restored = GraphSnapshot::from_ron(&text)
            .unwrap()
            .restore(&registry, adapters)
            .unwrap();

        assert_eq!(restored.node_count(), 2);
        assert_eq!(restored.edge_count(), 1);
        assert!(restored.edge(edge).is_some());
        let constant_node = restored.node(constant).unwrap();
        assert_eq!(constant_node.custom_name(), Some("five"));
        assert_eq!(constant_node.position, [10.0, 20.0]);
        assert_eq!(constant_node.values.get("out"), Some(&Value::Int(5)));

        // The restored graph is live: it evaluates.
        let processor = crate::processor::Processor::new(&mut restored).unwrap();
        processor.run(&mut restored);
        assert_eq!(restored.node(negate).unwrap().values.get("out"), Some(&Value::Int(-5)));
    }

    #[test]
    fn test_unknown_node_type_is_an_error() {
        let registry = registry();
        let adapters = Arc::new(TypeAdapterRegistry::new());
        let snapshot = GraphSnapshot {
            name: "demo".to_string(),
            nodes: vec![NodeSnapshot {
                id: NodeId::new(),
                type_id: "test.removed".to_string(),
                custom_name: None,
                position: [0.0, 0.0],
                values: IndexMap::new(),
            }],
            edges: Vec::new(),
        };
        assert!(matches!(
            snapshot.restore(&registry, adapters),
            Err(SnapshotError::UnknownNodeType(_))
        ));
    }

    #[test]
    fn test_edges_to_missing_ports_are_skipped() {
        let registry = registry();
        let adapters = Arc::new(TypeAdapterRegistry::new());
        let mut graph = Graph::new("demo", Arc::clone(&adapters));
        let constant = graph.add_node(registry.instantiate("test.constant").unwrap());
        let negate = graph.add_node(registry.instantiate("test.negate").unwrap());
        graph.connect(constant, ("out", ""), negate, ("x", "")).unwrap();

        let mut snapshot = GraphSnapshot::capture(&graph);
        snapshot.edges[0].input_field = "gone".to_string();

        let restored = snapshot.restore(&registry, adapters).unwrap();
        assert_eq!(restored.node_count(), 2);
        assert_eq!(restored.edge_count(), 0);
    }
}
