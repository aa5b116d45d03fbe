//! Prediction model registry
//!
//! A small fixed set of named models whose per-user (or per-user-per-skill)
//! numeric predictions are recomputed from recent aggregates on every pass.
//! Updates are last-write-wins per key; there is no rollback or audit trail.
//! All predictions are clamped to [0, 100].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::trace;

use crate::event::{ActivityEvent, TrackCategory};
use crate::stats::{linear_slope, mean};

/// Kind of prediction a model produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Probability-like score for exam success
    ExamSuccess,
    /// Mastery score per practiced skill
    SkillMastery,
    /// Estimated completion time (extension point, computes nothing)
    CompletionTime,
}

/// A single model output for one key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Model that produced this entry
    pub model: String,

    /// `user_id` or `user_id:sub_key` composite
    pub key: String,

    /// Forecast value in [0, 100]
    pub value: f64,
}

/// Long-lived per-model state held by the results store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSnapshot {
    /// Model identifier
    pub id: String,

    /// Kind of prediction
    pub kind: ModelKind,

    /// Rough historical accuracy of the model family
    pub accuracy: f64,

    /// Last time any key of this model was recomputed
    pub last_trained: DateTime<Utc>,

    /// Current predictions, keyed by user id or `user:sub_key`
    pub predictions: HashMap<String, f64>,
}

impl ModelSnapshot {
    /// Empty snapshot for a model
    pub fn new(id: impl Into<String>, kind: ModelKind, accuracy: f64) -> Self {
        Self {
            id: id.into(),
            kind,
            accuracy,
            last_trained: Utc::now(),
            predictions: HashMap::new(),
        }
    }
}

/// A named function mapping a user (plus optional sub-key) to a forecast
///
/// Models are pure over the event history handed to them; the registry owns
/// clamping and the store owns persistence of the resulting entries.
pub trait PredictionModel: Send + Sync {
    /// Stable model identifier
    fn id(&self) -> &'static str;

    /// Kind of prediction
    fn kind(&self) -> ModelKind;

    /// Rough historical accuracy of the model family
    fn accuracy(&self) -> f64;

    /// Recompute predictions for one user from recent history
    ///
    /// Returns `(key, value)` entries; an empty vector means no update this
    /// pass. Must never panic and never block.
    fn predict(&self, user_id: &str, history: &[ActivityEvent]) -> Vec<(String, f64)>;
}

/// Predicts exam success from recent test scores
///
/// `clamp(0, 100, min(95, mean(scores)) + slope(scores) * 10)` with at least
/// two score samples; the base term is capped at 95 so the trend adjustment
/// is the only way to approach 100.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExamSuccessModel;

impl PredictionModel for ExamSuccessModel {
    fn id(&self) -> &'static str {
        "exam_success"
    }

    fn kind(&self) -> ModelKind {
        ModelKind::ExamSuccess
    }

    fn accuracy(&self) -> f64 {
        0.78
    }

    fn predict(&self, user_id: &str, history: &[ActivityEvent]) -> Vec<(String, f64)> {
        let scores: Vec<f64> = history
            .iter()
            .filter(|e| e.track == TrackCategory::Exam)
            .filter_map(|e| e.score())
            .collect();

        if scores.len() < 2 {
            return Vec::new();
        }

        let base = match mean(&scores) {
            Some(m) => m.min(95.0),
            None => return Vec::new(),
        };
        let predicted = (base + linear_slope(&scores) * 10.0).clamp(0.0, 100.0);

        vec![(user_id.to_string(), predicted)]
    }
}

/// Predicts per-skill mastery from skill-practice completion rates
///
/// Rates are fractions in [0, 1] on the wire; the model works on the
/// percentage scale so its output shares the [0, 100] range of the other
/// models: `clamp(0, 100, mean(rate%) + slope(rate%) * 20)`, keyed
/// `user_id:skill_id`, with at least two samples per skill.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkillMasteryModel;

impl PredictionModel for SkillMasteryModel {
    fn id(&self) -> &'static str {
        "skill_mastery"
    }

    fn kind(&self) -> ModelKind {
        ModelKind::SkillMastery
    }

    fn accuracy(&self) -> f64 {
        0.74
    }

    fn predict(&self, user_id: &str, history: &[ActivityEvent]) -> Vec<(String, f64)> {
        let mut by_skill: HashMap<&str, Vec<f64>> = HashMap::new();
        for event in history {
            if let (Some(skill), Some(rate)) = (event.skill_id(), event.completion_rate()) {
                by_skill.entry(skill).or_default().push(rate * 100.0);
            }
        }

        let mut entries: Vec<(String, f64)> = by_skill
            .into_iter()
            .filter(|(_, rates)| rates.len() >= 2)
            .filter_map(|(skill, rates)| {
                let avg = mean(&rates)?;
                let predicted = (avg + linear_slope(&rates) * 20.0).clamp(0.0, 100.0);
                Some((format!("{user_id}:{skill}"), predicted))
            })
            .collect();

        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

/// Declared extension point: consumes events, computes no value
///
/// Kept as a safe no-op on purpose; it never fails and never blocks the
/// pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionTimeModel;

impl PredictionModel for CompletionTimeModel {
    fn id(&self) -> &'static str {
        "completion_time"
    }

    fn kind(&self) -> ModelKind {
        ModelKind::CompletionTime
    }

    fn accuracy(&self) -> f64 {
        0.0
    }

    fn predict(&self, _user_id: &str, _history: &[ActivityEvent]) -> Vec<(String, f64)> {
        Vec::new()
    }
}

/// Output of one registry refresh for one model
#[derive(Debug, Clone)]
pub struct ModelUpdate {
    /// Model identifier
    pub model_id: String,

    /// Kind of prediction
    pub kind: ModelKind,

    /// Model accuracy, carried into the snapshot
    pub accuracy: f64,

    /// Recomputed entries, already clamped
    pub entries: Vec<(String, f64)>,
}

/// The fixed set of prediction models
pub struct PredictionRegistry {
    models: Vec<Box<dyn PredictionModel>>,
}

impl Default for PredictionRegistry {
    fn default() -> Self {
        Self {
            models: vec![
                Box::new(ExamSuccessModel),
                Box::new(SkillMasteryModel),
                Box::new(CompletionTimeModel),
            ],
        }
    }
}

impl PredictionRegistry {
    /// Registry with a custom model set (tests, extensions)
    pub fn with_models(models: Vec<Box<dyn PredictionModel>>) -> Self {
        Self { models }
    }

    /// Recompute every model for one user
    ///
    /// Models that produce no entries this pass are skipped; values are
    /// clamped defensively even though models already clamp.
    pub fn refresh(&self, user_id: &str, history: &[ActivityEvent]) -> Vec<ModelUpdate> {
        self.models
            .iter()
            .filter_map(|model| {
                let entries: Vec<(String, f64)> = model
                    .predict(user_id, history)
                    .into_iter()
                    .map(|(key, value)| (key, value.clamp(0.0, 100.0)))
                    .collect();

                if entries.is_empty() {
                    return None;
                }

                trace!(
                    model = model.id(),
                    user_id,
                    entries = entries.len(),
                    "model refreshed"
                );

                Some(ModelUpdate {
                    model_id: model.id().to_string(),
                    kind: model.kind(),
                    accuracy: model.accuracy(),
                    entries,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use chrono::Duration;

    fn score_history(scores: &[f64]) -> Vec<ActivityEvent> {
        let base = Utc::now() - Duration::hours(2);
        scores
            .iter()
            .enumerate()
            .map(|(i, &score)| {
                ActivityEvent::at(
                    "u1",
                    TrackCategory::Exam,
                    EventKind::TestCompleted {
                        score,
                        time_spent_minutes: None,
                    },
                    base + Duration::minutes(i as i64),
                )
            })
            .collect()
    }

    fn skill_history(skill: &str, rates: &[f64]) -> Vec<ActivityEvent> {
        let base = Utc::now() - Duration::hours(2);
        rates
            .iter()
            .enumerate()
            .map(|(i, &completion_rate)| {
                ActivityEvent::at(
                    "u1",
                    TrackCategory::CourseTech,
                    EventKind::SkillPractice {
                        skill_id: skill.to_string(),
                        completion_rate,
                    },
                    base + Duration::minutes(i as i64),
                )
            })
            .collect()
    }

    #[test]
    fn test_exam_success_base_capped_at_95() {
        let model = ExamSuccessModel;
        // mean 97 -> base min(95, 97) = 95; slope 1 -> 95 + 10 = 105 -> 100
        let entries = model.predict("u1", &score_history(&[96.0, 97.0, 98.0]));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "u1");
        assert_eq!(entries[0].1, 100.0);
    }

    #[test]
    fn test_exam_success_never_exceeds_bounds() {
        let model = ExamSuccessModel;
        for scores in [
            vec![100.0, 100.0, 100.0],
            vec![0.0, 0.0],
            vec![90.0, 10.0],
            vec![10.0, 90.0],
        ] {
            for (_, value) in model.predict("u1", &score_history(&scores)) {
                assert!((0.0..=100.0).contains(&value), "value {value} out of range");
            }
        }
    }

    #[test]
    fn test_exam_success_requires_two_samples() {
        let model = ExamSuccessModel;
        assert!(model.predict("u1", &score_history(&[88.0])).is_empty());
        assert!(model.predict("u1", &[]).is_empty());
    }

    #[test]
    fn test_exam_success_plain_case() {
        let model = ExamSuccessModel;
        // mean 70, slope 10 -> 70 + 100 -> clamped... no: slope of [60,70,80]
        // is 10, 70 + 100 = 170 -> 100
        let entries = model.predict("u1", &score_history(&[60.0, 70.0, 80.0]));
        assert_eq!(entries[0].1, 100.0);

        // flat series: mean 70, slope 0 -> 70
        let entries = model.predict("u1", &score_history(&[70.0, 70.0, 70.0]));
        assert_eq!(entries[0].1, 70.0);
    }

    #[test]
    fn test_skill_mastery_keys_and_grouping() {
        let model = SkillMasteryModel;
        let mut history = skill_history("ownership", &[0.5, 0.6, 0.7]);
        history.extend(skill_history("lifetimes", &[0.4, 0.4]));
        // single sample: below the per-skill minimum
        history.extend(skill_history("macros", &[0.9]));

        let entries = model.predict("u1", &history);
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["u1:lifetimes", "u1:ownership"]);

        for (_, value) in &entries {
            assert!((0.0..=100.0).contains(value));
        }

        // ownership: percent series [50, 60, 70], mean 60, slope 10 -> 60 +
        // 200 -> clamped to 100
        let ownership = entries.iter().find(|(k, _)| k == "u1:ownership").unwrap();
        assert_eq!(ownership.1, 100.0);

        // lifetimes: flat 40% -> 40
        let lifetimes = entries.iter().find(|(k, _)| k == "u1:lifetimes").unwrap();
        assert!((lifetimes.1 - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_completion_time_is_a_safe_noop() {
        let model = CompletionTimeModel;
        assert!(model.predict("u1", &score_history(&[10.0, 20.0, 30.0])).is_empty());
        assert!(model.predict("u1", &[]).is_empty());
    }

    #[test]
    fn test_registry_skips_models_without_entries() {
        let registry = PredictionRegistry::default();
        let updates = registry.refresh("u1", &score_history(&[80.0, 85.0]));

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].model_id, "exam_success");
    }

    #[test]
    fn test_registry_refresh_multiple_models() {
        let registry = PredictionRegistry::default();
        let mut history = score_history(&[80.0, 85.0]);
        history.extend(skill_history("ownership", &[0.5, 0.6]));

        let updates = registry.refresh("u1", &history);
        let ids: Vec<&str> = updates.iter().map(|u| u.model_id.as_str()).collect();
        assert!(ids.contains(&"exam_success"));
        assert!(ids.contains(&"skill_mastery"));
        assert!(!ids.contains(&"completion_time"));
    }
}
