//! Executes frozen tool calls against the host capability.
//!
//! The dispatcher is deliberately forgiving at the boundary: the upstream
//! model may hallucinate tool names or omit arguments, and it has to receive
//! a recoverable `ToolResult` it can read and correct — never a crash, never
//! a dropped session.

use super::capability::{SetEntry, ToolCapability};
use super::schema::{self, ToolSchema};
use super::{ToolCall, ToolResult};
use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
}

/// Looks up a call against the registry and runs it through the capability.
pub struct ToolDispatcher {
    capability: Arc<dyn ToolCapability>,
    registry: Vec<ToolSchema>,
}

impl ToolDispatcher {
    pub fn new(capability: Arc<dyn ToolCapability>) -> Self {
        Self {
            capability,
            registry: schema::registry(),
        }
    }

    /// Execute a call, absorbing every failure mode into the result.
    ///
    /// Unknown names become `success: false` so the model gets a reply it
    /// can recover from.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        match self.try_execute(call).await {
            Ok(result) => result,
            Err(DispatchError::UnknownTool(name)) => {
                warn!(tool = %name, "model requested an unknown tool");
                ToolResult::failure(format!("unknown tool '{name}'"))
            }
        }
    }

    /// Execute a call, surfacing an unknown name as an error.
    pub async fn try_execute(&self, call: &ToolCall) -> Result<ToolResult, DispatchError> {
        if !self.registry.iter().any(|t| t.name == call.name) {
            return Err(DispatchError::UnknownTool(call.name.clone()));
        }
        info!(tool = %call.name, id = %call.id, "dispatching tool call");

        let result = match call.name.as_str() {
            "suggest_workout_day" => self.suggest_workout_day(call).await,
            "navigate" => self.navigate(call).await,
            "select_exercise" => self.select_exercise(call).await,
            "recommend_weight" => self.recommend_weight(call).await,
            "log_set" => self.log_set(call).await,
            "undo_last_set" => self.undo_last_set(call).await,
            "summarize_history" => self.summarize_history(call).await,
            other => return Err(DispatchError::UnknownTool(other.to_string())),
        };

        Ok(result.unwrap_or_else(|message| ToolResult::failure(message)))
    }

    async fn suggest_workout_day(&self, call: &ToolCall) -> Result<ToolResult, String> {
        let focus = optional_str(call, "focus")?;
        match self.capability.suggest_workout_day(focus).await {
            Ok(day) => {
                let mut data = BTreeMap::new();
                data.insert("recommendation".into(), Value::from(day.recommendation.clone()));
                data.insert("rationale".into(), Value::from(day.rationale));
                Ok(ToolResult::ok_with(day.recommendation, data))
            }
            Err(e) => Ok(ToolResult::failure(format!("suggest_workout_day failed: {e}"))),
        }
    }

    async fn navigate(&self, call: &ToolCall) -> Result<ToolResult, String> {
        let destination = require_str(call, "destination")?;
        let arg = optional_str(call, "arg")?;
        match self.capability.navigate(destination.clone(), arg).await {
            Ok(()) => Ok(ToolResult::ok(format!("navigated to {destination}"))),
            Err(e) => Ok(ToolResult::failure(format!("navigate failed: {e}"))),
        }
    }

    async fn select_exercise(&self, call: &ToolCall) -> Result<ToolResult, String> {
        let name = require_str(call, "name")?;
        match self.capability.select_exercise(name.clone()).await {
            Ok(()) => Ok(ToolResult::ok(format!("selected {name}"))),
            Err(e) => Ok(ToolResult::failure(format!("select_exercise failed: {e}"))),
        }
    }

    async fn recommend_weight(&self, call: &ToolCall) -> Result<ToolResult, String> {
        let exercise = require_str(call, "exercise")?;
        let target_reps = require_u32(call, "target_reps")?;
        let rpe = optional_f64(call, "rpe")?;
        match self
            .capability
            .recommend_weight(exercise, target_reps, rpe)
            .await
        {
            Ok(rec) => {
                let mut data = BTreeMap::new();
                data.insert("weight".into(), Value::Float(rec.weight));
                data.insert("rationale".into(), Value::from(rec.rationale.clone()));
                Ok(ToolResult::ok_with(
                    format!("recommend {} at your working weight", rec.weight),
                    data,
                ))
            }
            Err(e) => Ok(ToolResult::failure(format!("recommend_weight failed: {e}"))),
        }
    }

    async fn log_set(&self, call: &ToolCall) -> Result<ToolResult, String> {
        let entry = SetEntry {
            exercise: require_str(call, "exercise")?,
            reps: require_u32(call, "reps")?,
            weight: require_f64(call, "weight")?,
            rpe: optional_f64(call, "rpe")?,
            notes: optional_str(call, "notes")?,
        };
        let summary = format!(
            "logged {} x {} @ {}",
            entry.exercise, entry.reps, entry.weight
        );
        match self.capability.log_set(entry).await {
            Ok(()) => Ok(ToolResult::ok(summary)),
            Err(e) => Ok(ToolResult::failure(format!("log_set failed: {e}"))),
        }
    }

    async fn undo_last_set(&self, call: &ToolCall) -> Result<ToolResult, String> {
        let exercise = optional_str(call, "exercise")?;
        match self.capability.undo_last_set(exercise).await {
            Ok(Some(entry)) => Ok(ToolResult::ok(format!(
                "removed {} x {} @ {}",
                entry.exercise, entry.reps, entry.weight
            ))),
            Ok(None) => Ok(ToolResult::failure("no set to undo")),
            Err(e) => Ok(ToolResult::failure(format!("undo_last_set failed: {e}"))),
        }
    }

    async fn summarize_history(&self, call: &ToolCall) -> Result<ToolResult, String> {
        let window_days = require_u32(call, "window_days")?;
        match self.capability.summarize_history(window_days).await {
            Ok(summary) => {
                let mut data = BTreeMap::new();
                data.insert(
                    "highlights".into(),
                    Value::List(summary.highlights.iter().map(|h| Value::from(h.as_str())).collect()),
                );
                data.insert("summary".into(), Value::from(summary.summary_json));
                Ok(ToolResult::ok_with(
                    format!("summary of the last {window_days} days"),
                    data,
                ))
            }
            Err(e) => Ok(ToolResult::failure(format!("summarize_history failed: {e}"))),
        }
    }
}

// Typed argument extraction. A missing or mistyped required key is reported
// in the exact wording the upstream is told to expect.

fn missing(key: &str) -> String {
    format!("missing/invalid argument {key}")
}

fn require_str(call: &ToolCall, key: &str) -> Result<String, String> {
    call.arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| missing(key))
}

fn require_u32(call: &ToolCall, key: &str) -> Result<u32, String> {
    call.arguments
        .get(key)
        .and_then(Value::as_i64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| missing(key))
}

fn require_f64(call: &ToolCall, key: &str) -> Result<f64, String> {
    call.arguments
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| missing(key))
}

fn optional_str(call: &ToolCall, key: &str) -> Result<Option<String>, String> {
    match call.arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| missing(key)),
    }
}

fn optional_f64(call: &ToolCall, key: &str) -> Result<Option<f64>, String> {
    match call.arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_f64().map(Some).ok_or_else(|| missing(key)),
    }
}
