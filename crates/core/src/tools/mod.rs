//! The tool layer: what the model may call, and how calls are executed.

pub mod capability;
pub mod dispatch;
pub mod schema;

pub use capability::ToolCapability;
pub use dispatch::{DispatchError, ToolDispatcher};
pub use schema::{ParameterSpec, ParameterType, ToolSchema};

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A complete, immutable tool invocation, ready for dispatch.
///
/// Produced only by the aggregator freezing a draft; never constructed from
/// a partial frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// The upstream correlation id; results are tagged with it on the way
    /// back.
    pub id: String,
    pub name: String,
    pub arguments: BTreeMap<String, Value>,
}

/// The outcome of executing a tool call, relayed back upstream as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, Value>>,
}

impl ToolResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn ok_with(message: impl Into<String>, data: BTreeMap<String, Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_round_trips_through_json() {
        let mut weights = BTreeMap::new();
        weights.insert("weight".to_string(), Value::Float(102.5));
        weights.insert(
            "history".to_string(),
            Value::List(vec![Value::Int(95), Value::Int(100)]),
        );
        let mut data = BTreeMap::new();
        data.insert("recommendation".to_string(), Value::Map(weights));

        let result = ToolResult::ok_with("use 102.5 kg", data);
        let text = serde_json::to_string(&result).unwrap();
        let decoded: ToolResult = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, result);
    }

    #[test]
    fn absent_data_is_omitted_from_the_wire() {
        let text = serde_json::to_string(&ToolResult::failure("unknown tool")).unwrap();
        assert!(!text.contains("data"));
    }
}
