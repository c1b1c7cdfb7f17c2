//! A self-describing value for data that crosses the schema-less tool
//! boundary.
//!
//! Tool arguments arrive as model-generated JSON and tool results are
//! serialized back to the model as JSON, so both sides need a type that can
//! hold any shape and round-trip through text without loss. This is that
//! type: an explicit tagged union rather than an opaque "any" container, so
//! every encode/decode path is exhaustive.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A JSON-shaped value: null, bool, integer, float, string, list, or map.
///
/// Integers and floats are kept distinct so `{"reps": 5}` does not come back
/// as `5.0`. `Int` wins on decode whenever the literal has no fractional
/// part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric accessor: accepts both integer and float literals, since the
    /// model is free to write `135` or `135.0` for a weight.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Value::Map(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested_sample() -> Value {
        let mut inner = BTreeMap::new();
        inner.insert("reps".to_string(), Value::Int(5));
        inner.insert("weight".to_string(), Value::Float(102.5));
        inner.insert("notes".to_string(), Value::Null);

        let mut outer = BTreeMap::new();
        outer.insert("exercise".to_string(), Value::from("Bench Press"));
        outer.insert("set".to_string(), Value::Map(inner));
        outer.insert(
            "tags".to_string(),
            Value::List(vec![Value::from("push"), Value::Bool(true)]),
        );
        Value::Map(outer)
    }

    #[test]
    fn round_trips_nested_structures() {
        let original = nested_sample();
        let text = serde_json::to_string(&original).unwrap();
        let decoded: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn integers_and_floats_stay_distinct() {
        let decoded: Value = serde_json::from_str(r#"{"a": 5, "b": 5.0}"#).unwrap();
        let map = decoded.as_map().unwrap();
        assert_eq!(map["a"], Value::Int(5));
        assert_eq!(map["b"], Value::Float(5.0));
    }

    #[test]
    fn null_decodes_and_encodes() {
        let decoded: Value = serde_json::from_str("null").unwrap();
        assert!(decoded.is_null());
        assert_eq!(serde_json::to_string(&decoded).unwrap(), "null");
    }

    #[test]
    fn numeric_accessor_accepts_both_literals() {
        assert_eq!(Value::Int(135).as_f64(), Some(135.0));
        assert_eq!(Value::Float(132.5).as_f64(), Some(132.5));
        assert_eq!(Value::Text("135".into()).as_f64(), None);
    }
}
