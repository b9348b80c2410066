// SPDX-License-Identifier: MIT OR Apache-2.0
//! Value and type model for data flowing through ports.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Logical type that can flow through a port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortType {
    /// Boolean value
    Bool,
    /// Integer value
    Int,
    /// Floating point value
    Float,
    /// 2D vector
    Vector2,
    /// 3D vector
    Vector3,
    /// 4D vector
    Vector4,
    /// Color (RGBA)
    Color,
    /// String value
    String,
    /// Homogeneous collection of the element type
    List(Box<PortType>),
    /// String-keyed group of values (used by nested port groups)
    Map,
    /// Any type (for generic/relay ports)
    Any,
    /// Custom type, keyed by name
    Custom(String),
}

impl PortType {
    /// The element type exposed by a multi-edge input backed by a collection
    /// field. Unwraps exactly one level of `List`; any other type is
    /// returned unchanged.
    pub fn element_type(&self) -> PortType {
        match self {
            Self::List(elem) => (**elem).clone(),
            other => other.clone(),
        }
    }

    /// Whether this type is a collection.
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }
}

/// Value that can be stored in a node field or an edge buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absence of a value (reference-type default)
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i32),
    /// Float
    Float(f32),
    /// 2D vector
    Vector2([f32; 2]),
    /// 3D vector
    Vector3([f32; 3]),
    /// 4D vector
    Vector4([f32; 4]),
    /// Color
    Color([f32; 4]),
    /// String
    String(String),
    /// Ordered collection
    List(Vec<Value>),
    /// String-keyed group of values
    Map(IndexMap<String, Value>),
}

impl Value {
    /// Get the port type for this value.
    pub fn value_type(&self) -> PortType {
        match self {
            Self::Null => PortType::Any,
            Self::Bool(_) => PortType::Bool,
            Self::Int(_) => PortType::Int,
            Self::Float(_) => PortType::Float,
            Self::Vector2(_) => PortType::Vector2,
            Self::Vector3(_) => PortType::Vector3,
            Self::Vector4(_) => PortType::Vector4,
            Self::Color(_) => PortType::Color,
            Self::String(_) => PortType::String,
            Self::List(items) => {
                let elem = items
                    .first()
                    .map_or(PortType::Any, Value::value_type);
                PortType::List(Box::new(elem))
            }
            Self::Map(_) => PortType::Map,
        }
    }

    /// The zero-value for a port type: empty collection for lists, `Null`
    /// for reference-like types, the scalar default otherwise. Used when an
    /// input port loses its last edge.
    pub fn default_of(port_type: &PortType) -> Value {
        match port_type {
            PortType::Bool => Value::Bool(false),
            PortType::Int => Value::Int(0),
            PortType::Float => Value::Float(0.0),
            PortType::Vector2 => Value::Vector2([0.0; 2]),
            PortType::Vector3 => Value::Vector3([0.0; 3]),
            PortType::Vector4 => Value::Vector4([0.0; 4]),
            PortType::Color => Value::Color([0.0; 4]),
            PortType::String => Value::String(String::new()),
            PortType::List(_) => Value::List(Vec::new()),
            PortType::Map => Value::Map(IndexMap::new()),
            PortType::Any | PortType::Custom(_) => Value::Null,
        }
    }

    /// Whether this value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_type_unwraps_one_level() {
        let nested = PortType::List(Box::new(PortType::List(Box::new(PortType::Int))));
        assert_eq!(nested.element_type(), PortType::List(Box::new(PortType::Int)));
        assert_eq!(PortType::Float.element_type(), PortType::Float);
    }

    #[test]
    fn test_value_type_mapping() {
        assert_eq!(Value::Int(3).value_type(), PortType::Int);
        assert_eq!(
            Value::List(vec![Value::Float(1.0)]).value_type(),
            PortType::List(Box::new(PortType::Float))
        );
        assert_eq!(
            Value::List(Vec::new()).value_type(),
            PortType::List(Box::new(PortType::Any))
        );
    }

    #[test]
    fn test_default_of_zero_values() {
        assert_eq!(
            Value::default_of(&PortType::List(Box::new(PortType::Int))),
            Value::List(Vec::new())
        );
        assert_eq!(Value::default_of(&PortType::Any), Value::Null);
        assert_eq!(Value::default_of(&PortType::String), Value::String(String::new()));
    }
}
