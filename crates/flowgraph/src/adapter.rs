// SPDX-License-Identifier: MIT OR Apache-2.0
//! Type adapter registry: explicit conversions between port types.
//!
//! Two ports with different types can only be connected when a conversion
//! was registered here. There is no implicit narrowing; `Any` connects to
//! everything.

use crate::value::{PortType, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Conversion function applied to values crossing an edge between two
/// different port types.
pub type AdapterFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Registry of type conversions, constructed once at startup and shared by
/// the graphs that should agree on connectivity rules.
#[derive(Clone, Default)]
pub struct TypeAdapterRegistry {
    adapters: HashMap<(PortType, PortType), AdapterFn>,
}

impl TypeAdapterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a conversion from one port type to another.
    pub fn register<F>(&mut self, from: PortType, to: PortType, convert: F)
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.adapters.insert((from, to), Arc::new(convert));
    }

    /// Whether a conversion from `from` to `to` was registered.
    pub fn are_assignable(&self, from: &PortType, to: &PortType) -> bool {
        self.adapters.contains_key(&(from.clone(), to.clone()))
    }

    /// Whether an output of type `from` may be wired into an input of type
    /// `to`: identical types, an `Any` endpoint, or a registered adapter.
    pub fn types_are_connectable(&self, from: &PortType, to: &PortType) -> bool {
        if matches!(from, PortType::Any) || matches!(to, PortType::Any) {
            return true;
        }
        if from == to {
            return true;
        }
        self.are_assignable(from, to)
    }

    /// Convert a value to the target type using a registered adapter. The
    /// value is returned unchanged when no adapter applies.
    pub fn convert(&self, value: &Value, to: &PortType) -> Value {
        let from = value.value_type();
        match self.adapters.get(&(from, to.clone())) {
            Some(adapter) => adapter(value),
            None => value.clone(),
        }
    }
}

impl std::fmt::Debug for TypeAdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeAdapterRegistry")
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}
