// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dataflow node graph engine.
//!
//! This crate provides a typed node graph that powers dataflow tools:
//! - Nodes declared by schema, with ports generated from field metadata
//! - Connection validation through an explicit type adapter registry
//! - Value propagation along edges, with multi-edge aggregation
//! - Topological evaluation scheduling
//! - Subgraph and macro boundaries
//! - Plain-data snapshots (RON)
//!
//! ## Architecture
//!
//! A [`Graph`] owns nodes and edges and validates connections. Each node
//! pairs a shared [`NodeSchema`](schema::NodeSchema) with a
//! [`NodeBehavior`](node::NodeBehavior); the binding engine keeps the
//! runtime port set synchronized with what schema and behavior describe.
//! A [`Processor`](processor::Processor) orders the nodes topologically
//! and runs evaluation passes, moving values through per-edge buffers.

pub mod adapter;
pub mod binding;
pub mod edge;
pub mod graph;
pub mod node;
pub mod port;
pub mod processor;
pub mod propagation;
pub mod schema;
pub mod snapshot;
pub mod subgraph;
pub mod value;

pub use adapter::TypeAdapterRegistry;
pub use binding::{PortSyncReport, CASCADE_ITERATION_CAP};
pub use edge::{Edge, EdgeId};
pub use graph::{ConnectError, Graph, GraphEvent};
pub use node::{Node, NodeBehavior, NodeError, NodeId, NodeMessage, NodeMessageSeverity};
pub use port::{EdgeProcessOrder, NodePort, PortDescriptor, PortDirection};
pub use processor::{CycleError, Processor};
pub use schema::{NodeSchema, NodeTypeRegistry};
pub use snapshot::{GraphSnapshot, SnapshotError};
pub use subgraph::{SubGraphNodeBehavior, SubGraphPortSchema};
pub use value::{PortType, Value};
