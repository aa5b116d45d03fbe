//! Results store
//!
//! In-memory read model for insights, patterns and predictions. Callers only
//! read; the engine's flush cycle is the sole writer. Expired insights are
//! filtered on read, not deleted.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::cmp::Reverse;

use crate::insights::Insight;
use crate::patterns::Pattern;
use crate::predictions::{ModelSnapshot, ModelUpdate, Prediction};

/// In-memory read model exposed through the query API
#[derive(Default)]
pub struct ResultsStore {
    insights: DashMap<String, Vec<Insight>>,
    patterns: DashMap<String, Vec<Pattern>>,
    models: DashMap<String, ModelSnapshot>,
}

impl ResultsStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append this pass's insights for a user, preserving insertion order
    pub fn append_insights(&self, user_id: &str, insights: Vec<Insight>) {
        if insights.is_empty() {
            return;
        }
        self.insights
            .entry(user_id.to_string())
            .or_default()
            .extend(insights);
    }

    /// Replace a user's patterns with this pass's output
    ///
    /// Patterns are ephemeral: only the latest pass is queryable.
    pub fn replace_patterns(&self, user_id: &str, patterns: Vec<Pattern>) {
        if patterns.is_empty() {
            self.patterns.remove(user_id);
        } else {
            self.patterns.insert(user_id.to_string(), patterns);
        }
    }

    /// Merge one model refresh, last-write-wins per key
    pub fn apply_model_update(&self, update: &ModelUpdate, trained_at: DateTime<Utc>) {
        let mut snapshot = self
            .models
            .entry(update.model_id.clone())
            .or_insert_with(|| {
                ModelSnapshot::new(update.model_id.clone(), update.kind, update.accuracy)
            });
        snapshot.last_trained = trained_at;
        for (key, value) in &update.entries {
            snapshot.predictions.insert(key.clone(), *value);
        }
    }

    /// Unexpired insights for a user, highest impact first
    ///
    /// The sort is stable: equal-impact insights keep their insertion order.
    pub fn user_insights(&self, user_id: &str) -> Vec<Insight> {
        self.user_insights_at(user_id, Utc::now())
    }

    /// Same as [`ResultsStore::user_insights`] with an explicit clock
    pub fn user_insights_at(&self, user_id: &str, now: DateTime<Utc>) -> Vec<Insight> {
        let mut insights: Vec<Insight> = self
            .insights
            .get(user_id)
            .map(|entry| {
                entry
                    .iter()
                    .filter(|i| i.is_current(now))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        insights.sort_by_key(|i| Reverse(i.impact.weight()));
        insights
    }

    /// A user's latest-pass patterns, highest confidence first
    pub fn user_patterns(&self, user_id: &str) -> Vec<Pattern> {
        let mut patterns: Vec<Pattern> = self
            .patterns
            .get(user_id)
            .map(|entry| entry.clone())
            .unwrap_or_default();

        patterns.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        patterns
    }

    /// Union of all model entries keyed by this user
    ///
    /// Matches the bare user id and any `user_id:sub_key` composite.
    pub fn user_predictions(&self, user_id: &str) -> Vec<Prediction> {
        let prefix = format!("{user_id}:");
        let mut predictions = Vec::new();

        for snapshot in self.models.iter() {
            for (key, value) in &snapshot.predictions {
                if key == user_id || key.starts_with(&prefix) {
                    predictions.push(Prediction {
                        model: snapshot.id.clone(),
                        key: key.clone(),
                        value: *value,
                    });
                }
            }
        }

        predictions.sort_by(|a, b| (&a.model, &a.key).cmp(&(&b.model, &b.key)));
        predictions
    }

    /// Snapshot of one model's state, if it has ever trained
    pub fn model(&self, model_id: &str) -> Option<ModelSnapshot> {
        self.models.get(model_id).map(|entry| entry.clone())
    }
}
