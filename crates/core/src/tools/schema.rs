//! Tool schemas advertised to the upstream model at session start.
//!
//! The wire shape is the JSON-schema subset both transports understand:
//! `{name, description, parameters: {type: "object", properties, required}}`.

use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Integer,
    Number,
    Boolean,
}

/// One named parameter of a tool.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterSpec {
    #[serde(rename = "type")]
    pub kind: ParameterType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
}

impl ParameterSpec {
    pub fn new(kind: ParameterType, description: &str) -> Self {
        Self {
            kind,
            description: Some(description.to_string()),
            choices: None,
        }
    }

    pub fn with_choices(mut self, choices: &[&str]) -> Self {
        self.choices = Some(choices.iter().map(|c| c.to_string()).collect());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectSchema {
    #[serde(rename = "type")]
    kind: &'static str,
    pub properties: BTreeMap<String, ParameterSpec>,
    pub required: Vec<String>,
}

/// A declared tool: advertised verbatim to the upstream so it can decide
/// when to emit a call.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: ObjectSchema,
}

impl ToolSchema {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: ObjectSchema {
                kind: "object",
                properties: BTreeMap::new(),
                required: Vec::new(),
            },
        }
    }

    pub fn required(mut self, name: &str, spec: ParameterSpec) -> Self {
        self.parameters.properties.insert(name.to_string(), spec);
        self.parameters.required.push(name.to_string());
        self
    }

    pub fn optional(mut self, name: &str, spec: ParameterSpec) -> Self {
        self.parameters.properties.insert(name.to_string(), spec);
        self
    }

    /// Required parameter names, in declaration order.
    pub fn required_keys(&self) -> &[String] {
        &self.parameters.required
    }
}

/// The fixed registry of operations the coach supports.
pub fn registry() -> Vec<ToolSchema> {
    use ParameterType::*;
    vec![
        ToolSchema::new(
            "suggest_workout_day",
            "Recommend which workout day to run next, based on the rotation and recent history.",
        )
        .optional(
            "focus",
            ParameterSpec::new(String, "Optional muscle-group or movement focus, e.g. 'push'."),
        ),
        ToolSchema::new("navigate", "Move the app to a different screen.")
            .required(
                "destination",
                ParameterSpec::new(String, "The screen to open.")
                    .with_choices(&["today", "history", "stats", "exercise", "settings"]),
            )
            .optional(
                "arg",
                ParameterSpec::new(String, "Optional argument, e.g. an exercise name for 'exercise'."),
            ),
        ToolSchema::new(
            "select_exercise",
            "Select the exercise that subsequent sets will be logged against.",
        )
        .required("name", ParameterSpec::new(String, "The exercise name.")),
        ToolSchema::new(
            "recommend_weight",
            "Recommend a working weight for an exercise at a target rep count.",
        )
        .required("exercise", ParameterSpec::new(String, "The exercise name."))
        .required(
            "target_reps",
            ParameterSpec::new(Integer, "How many reps the set should reach."),
        )
        .optional(
            "rpe",
            ParameterSpec::new(Number, "Target rate of perceived exertion, 1-10."),
        ),
        ToolSchema::new("log_set", "Record one completed set for an exercise.")
            .required("exercise", ParameterSpec::new(String, "The exercise name."))
            .required("reps", ParameterSpec::new(Integer, "Reps completed."))
            .required("weight", ParameterSpec::new(Number, "Weight used, in the user's unit."))
            .optional("rpe", ParameterSpec::new(Number, "Rate of perceived exertion, 1-10."))
            .optional("notes", ParameterSpec::new(String, "Free-form notes for the set.")),
        ToolSchema::new(
            "undo_last_set",
            "Remove the most recently logged set, optionally scoped to one exercise.",
        )
        .optional(
            "exercise",
            ParameterSpec::new(String, "Only undo the last set of this exercise."),
        ),
        ToolSchema::new(
            "summarize_history",
            "Summarize training history over a trailing window.",
        )
        .required(
            "window_days",
            ParameterSpec::new(Integer, "How many days back to include."),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_declares_the_supported_operations() {
        let names: Vec<_> = registry().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "suggest_workout_day",
                "navigate",
                "select_exercise",
                "recommend_weight",
                "log_set",
                "undo_last_set",
                "summarize_history",
            ]
        );
    }

    #[test]
    fn schema_serializes_to_the_wire_shape() {
        let schema = ToolSchema::new("log_set", "Record a set.")
            .required("reps", ParameterSpec::new(ParameterType::Integer, "Reps."))
            .optional("notes", ParameterSpec::new(ParameterType::String, "Notes."));
        let json = serde_json::to_value(&schema).unwrap();

        assert_eq!(json["parameters"]["type"], "object");
        assert_eq!(json["parameters"]["required"], serde_json::json!(["reps"]));
        assert_eq!(json["parameters"]["properties"]["reps"]["type"], "integer");
        assert!(json["parameters"]["properties"]["notes"]["enum"].is_null());
    }

    #[test]
    fn enum_choices_appear_on_the_wire() {
        let schema = registry().into_iter().find(|t| t.name == "navigate").unwrap();
        let json = serde_json::to_value(&schema).unwrap();
        let choices = &json["parameters"]["properties"]["destination"]["enum"];
        assert!(choices.as_array().unwrap().contains(&"history".into()));
    }
}
