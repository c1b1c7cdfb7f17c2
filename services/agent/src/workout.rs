//! An in-memory workout log implementing the tool capability.
//!
//! This is the host side a real app would back with its own storage and
//! UI; here it keeps everything in one mutex-guarded state so the agent can
//! be exercised end to end from the command line.

use anyhow::{bail, Result};
use async_trait::async_trait;
use repcoach_core::tools::capability::{
    DayRecommendation, HistorySummary, SetEntry, ToolCapability, WeightRecommendation,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::info;

const SCREENS: &[&str] = &["today", "history", "stats", "exercise", "settings"];
const DAY_ROTATION: &[&str] = &["push", "pull", "legs"];

#[derive(Debug, Default)]
struct LogState {
    sets: Vec<(SystemTime, SetEntry)>,
    selected_exercise: Option<String>,
    screen: Option<String>,
    rotation_cursor: usize,
}

#[derive(Debug, Default)]
pub struct InMemoryWorkoutLog {
    inner: Mutex<LogState>,
}

impl InMemoryWorkoutLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The screen most recently navigated to, if any.
    pub async fn current_screen(&self) -> Option<String> {
        self.inner.lock().await.screen.clone()
    }

    pub async fn selected_exercise(&self) -> Option<String> {
        self.inner.lock().await.selected_exercise.clone()
    }

    pub async fn set_count(&self) -> usize {
        self.inner.lock().await.sets.len()
    }
}

/// One-rep-max estimate (Epley) used to carry a weight from one rep count
/// to another.
fn estimated_max(weight: f64, reps: u32) -> f64 {
    weight * (1.0 + reps as f64 / 30.0)
}

fn round_to_plate(weight: f64) -> f64 {
    (weight / 2.5).round() * 2.5
}

#[async_trait]
impl ToolCapability for InMemoryWorkoutLog {
    async fn suggest_workout_day(&self, focus: Option<String>) -> Result<DayRecommendation> {
        if let Some(focus) = focus {
            return Ok(DayRecommendation {
                recommendation: focus.clone(),
                rationale: format!("you asked to focus on {focus}"),
            });
        }
        let mut state = self.inner.lock().await;
        let day = DAY_ROTATION[state.rotation_cursor % DAY_ROTATION.len()];
        let previous = if state.rotation_cursor == 0 {
            "no previous session".to_string()
        } else {
            format!(
                "last session was {}",
                DAY_ROTATION[(state.rotation_cursor - 1) % DAY_ROTATION.len()]
            )
        };
        state.rotation_cursor += 1;
        Ok(DayRecommendation {
            recommendation: day.to_string(),
            rationale: format!("next in the push/pull/legs rotation; {previous}"),
        })
    }

    async fn navigate(&self, destination: String, arg: Option<String>) -> Result<()> {
        if !SCREENS.contains(&destination.as_str()) {
            bail!("unknown destination '{destination}'");
        }
        let mut state = self.inner.lock().await;
        if destination == "exercise" {
            if let Some(name) = arg {
                state.selected_exercise = Some(name);
            }
        }
        info!(screen = %destination, "navigating");
        state.screen = Some(destination);
        Ok(())
    }

    async fn select_exercise(&self, name: String) -> Result<()> {
        if name.trim().is_empty() {
            bail!("exercise name is empty");
        }
        self.inner.lock().await.selected_exercise = Some(name);
        Ok(())
    }

    async fn recommend_weight(
        &self,
        exercise: String,
        target_reps: u32,
        rpe: Option<f64>,
    ) -> Result<WeightRecommendation> {
        if target_reps == 0 {
            bail!("target_reps must be at least 1");
        }
        let state = self.inner.lock().await;
        let Some((_, last)) = state
            .sets
            .iter()
            .rev()
            .find(|(_, s)| s.exercise.eq_ignore_ascii_case(&exercise))
        else {
            bail!("no logged sets for '{exercise}'");
        };

        let max = estimated_max(last.weight, last.reps);
        let mut weight = max / (1.0 + target_reps as f64 / 30.0);
        // Leave reps in reserve for sub-maximal effort targets.
        if let Some(rpe) = rpe {
            weight *= 1.0 - 0.03 * (10.0 - rpe.clamp(5.0, 10.0));
        }
        let weight = round_to_plate(weight);
        Ok(WeightRecommendation {
            weight,
            rationale: format!(
                "based on your last set of {}: {} x {}",
                last.exercise, last.reps, last.weight
            ),
        })
    }

    async fn log_set(&self, entry: SetEntry) -> Result<()> {
        if entry.reps == 0 {
            bail!("a set needs at least one rep");
        }
        if entry.weight < 0.0 {
            bail!("weight cannot be negative");
        }
        let mut state = self.inner.lock().await;
        info!(exercise = %entry.exercise, reps = entry.reps, weight = entry.weight, "set logged");
        state.selected_exercise = Some(entry.exercise.clone());
        state.sets.push((SystemTime::now(), entry));
        Ok(())
    }

    async fn undo_last_set(&self, exercise: Option<String>) -> Result<Option<SetEntry>> {
        let mut state = self.inner.lock().await;
        let position = match &exercise {
            Some(name) => state
                .sets
                .iter()
                .rposition(|(_, s)| s.exercise.eq_ignore_ascii_case(name)),
            None => state.sets.len().checked_sub(1),
        };
        Ok(position.map(|i| state.sets.remove(i).1))
    }

    async fn summarize_history(&self, window_days: u32) -> Result<HistorySummary> {
        let state = self.inner.lock().await;
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(u64::from(window_days) * 86_400));

        let recent: Vec<&SetEntry> = state
            .sets
            .iter()
            .filter(|(at, _)| cutoff.is_none_or(|cutoff| *at >= cutoff))
            .map(|(_, s)| s)
            .collect();

        if recent.is_empty() {
            return Ok(HistorySummary {
                highlights: vec![format!("no sets logged in the last {window_days} days")],
                summary_json: json!({ "window_days": window_days, "exercises": {} }).to_string(),
            });
        }

        let mut per_exercise: BTreeMap<&str, (usize, u32, f64)> = BTreeMap::new();
        for set in &recent {
            let entry = per_exercise.entry(set.exercise.as_str()).or_default();
            entry.0 += 1;
            entry.1 += set.reps;
            entry.2 = entry.2.max(set.weight);
        }

        let (top_exercise, (top_sets, _, _)) = per_exercise
            .iter()
            .max_by_key(|(_, (sets, _, _))| *sets)
            .map(|(name, stats)| (*name, *stats))
            .unwrap_or(("", (0, 0, 0.0)));
        let heaviest = recent
            .iter()
            .map(|s| s.weight)
            .fold(f64::NEG_INFINITY, f64::max);

        let highlights = vec![
            format!("{} sets across {} exercises", recent.len(), per_exercise.len()),
            format!("most trained: {top_exercise} ({top_sets} sets)"),
            format!("heaviest set: {heaviest}"),
        ];
        let exercises: serde_json::Map<String, serde_json::Value> = per_exercise
            .iter()
            .map(|(name, (sets, reps, top))| {
                (
                    name.to_string(),
                    json!({ "sets": sets, "total_reps": reps, "top_weight": top }),
                )
            })
            .collect();
        Ok(HistorySummary {
            highlights,
            summary_json: json!({ "window_days": window_days, "exercises": exercises })
                .to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(exercise: &str, reps: u32, weight: f64) -> SetEntry {
        SetEntry {
            exercise: exercise.to_string(),
            reps,
            weight,
            rpe: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn logging_then_undoing_restores_the_log() {
        let log = InMemoryWorkoutLog::new();
        log.log_set(set("Squat", 5, 100.0)).await.unwrap();
        log.log_set(set("Squat", 5, 102.5)).await.unwrap();
        assert_eq!(log.set_count().await, 2);

        let removed = log.undo_last_set(None).await.unwrap().unwrap();
        assert_eq!(removed.weight, 102.5);
        assert_eq!(log.set_count().await, 1);
    }

    #[tokio::test]
    async fn undo_scoped_to_an_exercise_skips_others() {
        let log = InMemoryWorkoutLog::new();
        log.log_set(set("Squat", 5, 100.0)).await.unwrap();
        log.log_set(set("Bench Press", 8, 60.0)).await.unwrap();

        let removed = log
            .undo_last_set(Some("squat".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(removed.exercise, "Squat");
        assert_eq!(log.set_count().await, 1);
    }

    #[tokio::test]
    async fn undo_on_an_empty_log_returns_none() {
        let log = InMemoryWorkoutLog::new();
        assert!(log.undo_last_set(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recommendation_requires_history() {
        let log = InMemoryWorkoutLog::new();
        let err = log
            .recommend_weight("Deadlift".to_string(), 5, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Deadlift"));
    }

    #[tokio::test]
    async fn recommendation_scales_from_the_last_set() {
        let log = InMemoryWorkoutLog::new();
        log.log_set(set("Squat", 5, 100.0)).await.unwrap();

        // More reps at the same effort means less weight.
        let lighter = log
            .recommend_weight("Squat".to_string(), 10, None)
            .await
            .unwrap();
        assert!(lighter.weight < 100.0);

        // Plate-friendly increments.
        assert_eq!(lighter.weight % 2.5, 0.0);
    }

    #[tokio::test]
    async fn navigation_rejects_unknown_screens() {
        let log = InMemoryWorkoutLog::new();
        assert!(log.navigate("nowhere".to_string(), None).await.is_err());

        log.navigate("exercise".to_string(), Some("Squat".to_string()))
            .await
            .unwrap();
        assert_eq!(log.current_screen().await, Some("exercise".to_string()));
        assert_eq!(log.selected_exercise().await, Some("Squat".to_string()));
    }

    #[tokio::test]
    async fn day_suggestion_rotates_and_honors_focus() {
        let log = InMemoryWorkoutLog::new();
        let first = log.suggest_workout_day(None).await.unwrap();
        let second = log.suggest_workout_day(None).await.unwrap();
        assert_eq!(first.recommendation, "push");
        assert_eq!(second.recommendation, "pull");

        let focused = log
            .suggest_workout_day(Some("legs".to_string()))
            .await
            .unwrap();
        assert_eq!(focused.recommendation, "legs");
    }

    #[tokio::test]
    async fn history_summary_counts_per_exercise() {
        let log = InMemoryWorkoutLog::new();
        log.log_set(set("Squat", 5, 100.0)).await.unwrap();
        log.log_set(set("Squat", 5, 105.0)).await.unwrap();
        log.log_set(set("Bench Press", 8, 60.0)).await.unwrap();

        let summary = log.summarize_history(7).await.unwrap();
        assert!(summary.highlights[0].contains("3 sets"));
        assert!(summary.highlights[1].contains("Squat"));

        let parsed: serde_json::Value = serde_json::from_str(&summary.summary_json).unwrap();
        assert_eq!(parsed["exercises"]["Squat"]["sets"], 2);
        assert_eq!(parsed["exercises"]["Squat"]["top_weight"], 105.0);
    }
}
