//! The narrow boundary between the agent core and the host application.
//!
//! Everything a tool call can do to the app — navigation, logging sets,
//! recommendations, history queries — goes through this trait. The core
//! never touches storage, timers, or UI state directly; the host hands in
//! one implementation at startup.

use anyhow::Result;
use async_trait::async_trait;

/// A suggested workout day and the reasoning behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct DayRecommendation {
    pub recommendation: String,
    pub rationale: String,
}

/// A suggested working weight and the reasoning behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightRecommendation {
    pub weight: f64,
    pub rationale: String,
}

/// One completed set, as logged against an exercise.
#[derive(Debug, Clone, PartialEq)]
pub struct SetEntry {
    pub exercise: String,
    pub reps: u32,
    pub weight: f64,
    pub rpe: Option<f64>,
    pub notes: Option<String>,
}

/// A digest of recent training history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySummary {
    pub highlights: Vec<String>,
    pub summary_json: String,
}

/// Host-application actions the agent may invoke.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolCapability: Send + Sync {
    /// Recommend which workout day to run next.
    async fn suggest_workout_day(&self, focus: Option<String>) -> Result<DayRecommendation>;

    /// Move the app to another screen, with an optional argument such as an
    /// exercise name.
    async fn navigate(&self, destination: String, arg: Option<String>) -> Result<()>;

    /// Select the exercise that subsequent sets will be logged against.
    async fn select_exercise(&self, name: String) -> Result<()>;

    /// Recommend a working weight for an exercise at a target rep count.
    async fn recommend_weight(
        &self,
        exercise: String,
        target_reps: u32,
        rpe: Option<f64>,
    ) -> Result<WeightRecommendation>;

    /// Record one completed set.
    async fn log_set(&self, entry: SetEntry) -> Result<()>;

    /// Remove the most recently logged set, optionally scoped to one
    /// exercise. Returns the removed entry, if any.
    async fn undo_last_set(&self, exercise: Option<String>) -> Result<Option<SetEntry>>;

    /// Summarize training history over a trailing window of days.
    async fn summarize_history(&self, window_days: u32) -> Result<HistorySummary>;
}
