//! Value types flowing in and out of shared containers.
//!
//! `Value` covers the plain JSON-ish data the engine stores directly, the
//! three shared wrapper types, and subdocuments. Preliminary (detached)
//! containers carry `Value` trees until integration; reads out of integrated
//! containers produce `Value`s whose shared variants resolve through the
//! identity cache.

use std::collections::HashMap;

use crate::{
    document::Document,
    engine::Any,
    shared::{Array, Map, Text},
};

/// A value stored in (or destined for) a shared container.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Plain list, stored as engine data rather than a shared node.
    List(Vec<Value>),
    /// Plain string-keyed object, stored as engine data rather than a shared node.
    Object(HashMap<String, Value>),
    /// Collaborative map node.
    Map(Map),
    /// Collaborative sequence node.
    Array(Array),
    /// Collaborative text node.
    Text(Text),
    /// Nested subdocument.
    Doc(Document),
}

impl Value {
    /// Type name for diagnostics and mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Object(_) => "object",
            Value::Map(_) => "map",
            Value::Array(_) => "array",
            Value::Text(_) => "text",
            Value::Doc(_) => "doc",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(value) => Some(*value),
            Value::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Object(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&Text> {
        match self {
            Value::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_doc(&self) -> Option<&Document> {
        match self {
            Value::Doc(value) => Some(value),
            _ => None,
        }
    }

    /// Convert engine data into a plain value.
    pub(crate) fn from_any(any: &Any) -> Value {
        match any {
            Any::Null | Any::Undefined => Value::Null,
            Any::Bool(value) => Value::Bool(*value),
            Any::Number(value) => Value::Double(*value),
            Any::BigInt(value) => Value::Int(*value),
            Any::String(value) => Value::String(value.to_string()),
            Any::Buffer(value) => Value::Bytes(value.to_vec()),
            Any::Array(items) => Value::List(items.iter().map(Value::from_any).collect()),
            Any::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), Value::from_any(value)))
                    .collect(),
            ),
        }
    }

    /// Convert a plain value into engine data. Shared variants have no
    /// engine-data form and return `None`; they integrate as nodes instead.
    pub(crate) fn to_any(&self) -> Option<Any> {
        let any = match self {
            Value::Null => Any::Null,
            Value::Bool(value) => Any::Bool(*value),
            Value::Int(value) => Any::BigInt(*value),
            Value::Double(value) => Any::Number(*value),
            Value::String(value) => Any::String(value.as_str().into()),
            Value::Bytes(value) => Any::Buffer(value.clone().into()),
            Value::List(items) => Any::Array(
                items
                    .iter()
                    .map(Value::to_any)
                    .collect::<Option<Vec<Any>>>()?
                    .into(),
            ),
            Value::Object(entries) => Any::Map(
                entries
                    .iter()
                    .map(|(key, value)| Some((key.clone(), value.to_any()?)))
                    .collect::<Option<HashMap<String, Any>>>()?
                    .into(),
            ),
            Value::Map(_) | Value::Array(_) | Value::Text(_) | Value::Doc(_) => return None,
        };
        Some(any)
    }
}

// Plain variants compare structurally; shared variants compare by wrapper
// identity, matching the identity-cache guarantees.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Text(a), Value::Text(b)) => a.ptr_eq(b),
            (Value::Doc(a), Value::Doc(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<HashMap<String, T>> for Value {
    fn from(entries: HashMap<String, T>) -> Self {
        Value::Object(
            entries
                .into_iter()
                .map(|(key, value)| (key, value.into()))
                .collect(),
        )
    }
}

impl From<Map> for Value {
    fn from(value: Map) -> Self {
        Value::Map(value)
    }
}

impl From<Array> for Value {
    fn from(value: Array) -> Self {
        Value::Array(value)
    }
}

impl From<Text> for Value {
    fn from(value: Text) -> Self {
        Value::Text(value)
    }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self {
        Value::Doc(value)
    }
}
