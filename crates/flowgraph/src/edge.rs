// SPDX-License-Identifier: MIT OR Apache-2.0
//! Edge definitions: one producer output port feeding one consumer input
//! port, with a pass-through buffer carrying the value in transit.

use crate::node::NodeId;
use crate::port::EdgeProcessOrder;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub Uuid);

impl EdgeId {
    /// Create a new random edge ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EdgeId {
    fn default() -> Self {
        Self::new()
    }
}

/// A connection between an output port and an input port.
///
/// Endpoints are addressed by node GUID plus field name plus port
/// identifier, not by object references, so an edge survives a plain-data
/// snapshot round-trip and is re-resolved against live ports afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Unique edge ID
    pub id: EdgeId,
    /// Producing node
    pub output_node: NodeId,
    /// Field behind the producing port
    pub output_field: String,
    /// Identifier of the producing port
    pub output_identifier: String,
    /// Consuming node
    pub input_node: NodeId,
    /// Field behind the consuming port
    pub input_field: String,
    /// Identifier of the consuming port
    pub input_identifier: String,
    /// Value in transit for the current evaluation cycle
    #[serde(skip)]
    pub pass_through_buffer: Option<Value>,
}

impl Edge {
    /// Create a new edge between the given endpoints.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: EdgeId,
        output_node: NodeId,
        output_field: impl Into<String>,
        output_identifier: impl Into<String>,
        input_node: NodeId,
        input_field: impl Into<String>,
        input_identifier: impl Into<String>,
    ) -> Self {
        Self {
            id,
            output_node,
            output_field: output_field.into(),
            output_identifier: output_identifier.into(),
            input_node,
            input_field: input_field.into(),
            input_identifier: input_identifier.into(),
            pass_through_buffer: None,
        }
    }

    /// Check if this edge involves a specific node
    pub fn involves_node(&self, node: NodeId) -> bool {
        self.output_node == node || self.input_node == node
    }
}

/// Sort edge ids per the requested aggregation order. `producer_position`
/// is the canvas position of each edge's producing node, in the same order
/// as `edges` (which is connection order).
pub(crate) fn order_edges(
    order: EdgeProcessOrder,
    edges: Vec<EdgeId>,
    producer_position: &[[f32; 2]],
) -> Vec<EdgeId> {
    debug_assert_eq!(edges.len(), producer_position.len());
    let mut indexed: Vec<(usize, EdgeId)> = edges.into_iter().enumerate().collect();
    match order {
        EdgeProcessOrder::Fifo => {}
        EdgeProcessOrder::Lifo => indexed.reverse(),
        EdgeProcessOrder::TopToBottom => {
            indexed.sort_by(|a, b| producer_position[a.0][1].total_cmp(&producer_position[b.0][1]));
        }
        EdgeProcessOrder::BottomToTop => {
            indexed.sort_by(|a, b| producer_position[b.0][1].total_cmp(&producer_position[a.0][1]));
        }
        EdgeProcessOrder::LeftToRight => {
            indexed.sort_by(|a, b| producer_position[a.0][0].total_cmp(&producer_position[b.0][0]));
        }
        EdgeProcessOrder::RightToLeft => {
            indexed.sort_by(|a, b| producer_position[b.0][0].total_cmp(&producer_position[a.0][0]));
        }
    }
    indexed.into_iter().map(|(_, id)| id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_edges_lifo_and_spatial() {
        let ids: Vec<EdgeId> = (0..3).map(|_| EdgeId::new()).collect();
        let positions = [[0.0, 30.0], [0.0, 10.0], [0.0, 20.0]];

        let fifo = order_edges(EdgeProcessOrder::Fifo, ids.clone(), &positions);
        assert_eq!(fifo, ids);

        let lifo = order_edges(EdgeProcessOrder::Lifo, ids.clone(), &positions);
        assert_eq!(lifo, vec![ids[2], ids[1], ids[0]]);

        let top_down = order_edges(EdgeProcessOrder::TopToBottom, ids.clone(), &positions);
        assert_eq!(top_down, vec![ids[1], ids[2], ids[0]]);
    }
}
