//! Insight generator
//!
//! Derives human-facing, time-bounded insights from surfaced patterns and
//! from heuristics over a user's trailing event history. Insights are never
//! deduplicated across runs: a heuristic that fires on two consecutive
//! flushes yields two distinct records, acting as a reminder.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::event::{ActivityEvent, TrackCategory};
use crate::patterns::{Pattern, PatternKind};
use crate::stats::mean;

/// Impact level of an insight, used to order query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    Medium,
    Low,
}

impl Impact {
    /// Sort weight: high before medium before low
    pub fn weight(&self) -> u8 {
        match self {
            Impact::High => 3,
            Impact::Medium => 2,
            Impact::Low => 1,
        }
    }
}

/// Category of an insight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    /// Trend in measured performance
    Performance,
    /// Study behavior (balance, timing)
    Behavior,
    /// Outcome per unit of time spent
    Efficiency,
    /// Skills applied across tracks
    CrossTrack,
}

/// A human-readable, time-bounded, optionally actionable observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    /// Unique identifier
    pub id: Uuid,

    /// Category
    pub kind: InsightKind,

    /// Short title
    pub title: String,

    /// Detailed description
    pub description: String,

    /// Impact level
    pub impact: Impact,

    /// Whether the user can act on this insight directly
    pub actionable: bool,

    /// When the insight was generated
    pub created_at: DateTime<Utc>,

    /// Insights past this instant are stale: filtered on read, not deleted
    pub expires_at: DateTime<Utc>,
}

impl Insight {
    /// Whether the insight is still current at `now`
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Configuration for the insight generator
#[derive(Debug, Clone)]
pub struct InsightConfig {
    /// Trailing window the heuristics evaluate over
    pub history_window: Duration,

    /// Lifetime of pattern-derived insights
    pub pattern_ttl: Duration,

    /// Lifetime of balance insights
    pub balance_ttl: Duration,

    /// Lifetime of timing insights
    pub timing_ttl: Duration,

    /// Lifetime of efficiency insights
    pub efficiency_ttl: Duration,

    /// Pattern confidence above which the derived insight is high impact
    pub high_impact_confidence: f64,

    /// A category is over-weighted when its count exceeds this multiple of
    /// another active category's count
    pub balance_ratio: f64,

    /// Hour-of-day bands considered effective study time (inclusive)
    pub preferred_hours: Vec<(u32, u32)>,

    /// Minimum (time, score) pairs for the efficiency heuristic
    pub min_efficiency_samples: usize,

    /// Mean score-per-minute below which efficiency is flagged
    pub efficiency_floor: f64,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            history_window: Duration::days(7),
            pattern_ttl: Duration::days(30),
            balance_ttl: Duration::days(7),
            timing_ttl: Duration::days(14),
            efficiency_ttl: Duration::days(7),
            high_impact_confidence: 0.8,
            balance_ratio: 2.0,
            preferred_hours: vec![(9, 11), (15, 17)],
            min_efficiency_samples: 3,
            efficiency_floor: 1.5,
        }
    }
}

/// Generates insights from patterns and trailing-window heuristics
#[derive(Debug, Clone, Default)]
pub struct InsightGenerator {
    config: InsightConfig,
}

impl InsightGenerator {
    /// Create a generator with the given configuration
    pub fn new(config: InsightConfig) -> Self {
        Self { config }
    }

    /// Generate insights for one user from the current pass
    ///
    /// `patterns` is the surfaced output of the pattern recognizer for this
    /// pass; `history` is the user's trailing event history including the
    /// current batch, time-ordered.
    pub fn generate(
        &self,
        patterns: &[Pattern],
        history: &[ActivityEvent],
        now: DateTime<Utc>,
    ) -> Vec<Insight> {
        let mut insights: Vec<Insight> = patterns
            .iter()
            .map(|p| self.from_pattern(p, now))
            .collect();

        let window_start = now - self.config.history_window;
        let recent: Vec<&ActivityEvent> = history
            .iter()
            .filter(|e| e.timestamp > window_start)
            .collect();

        if let Some(insight) = self.balance_insight(&recent, now) {
            insights.push(insight);
        }
        if let Some(insight) = self.timing_insight(&recent, now) {
            insights.push(insight);
        }
        if let Some(insight) = self.efficiency_insight(&recent, now) {
            insights.push(insight);
        }

        debug!(count = insights.len(), "insights generated");
        insights
    }

    /// One insight per surfaced pattern
    fn from_pattern(&self, pattern: &Pattern, now: DateTime<Utc>) -> Insight {
        let track = pattern
            .applicable_tracks
            .first()
            .copied()
            .unwrap_or(TrackCategory::Exam);

        let kind = match track {
            TrackCategory::CrossTrack => InsightKind::CrossTrack,
            TrackCategory::Exam | TrackCategory::CourseTech => InsightKind::Performance,
        };

        let impact = if pattern.confidence > self.config.high_impact_confidence {
            Impact::High
        } else {
            Impact::Medium
        };

        let title = match pattern.kind {
            PatternKind::Improvement => format!("{} trend: improving", track.as_str()),
            PatternKind::Decline => format!("{} trend: declining", track.as_str()),
            PatternKind::Plateau => format!("{} trend: plateau", track.as_str()),
            PatternKind::Breakthrough => format!("{} breakthrough", track.as_str()),
        };

        Insight {
            id: Uuid::new_v4(),
            kind,
            title,
            description: pattern.description.clone(),
            impact,
            actionable: !pattern.recommended_actions.is_empty(),
            created_at: now,
            expires_at: now + self.config.pattern_ttl,
        }
    }

    /// Balance: one track crowds out another
    fn balance_insight(&self, recent: &[&ActivityEvent], now: DateTime<Utc>) -> Option<Insight> {
        let mut counts: HashMap<TrackCategory, usize> = HashMap::new();
        for event in recent {
            *counts.entry(event.track).or_insert(0) += 1;
        }

        // Needs at least two active tracks to be a balance question at all
        if counts.len() < 2 {
            return None;
        }

        let (&max_track, &max_count) = counts.iter().max_by_key(|(_, &c)| c)?;
        let (&min_track, &min_count) = counts.iter().min_by_key(|(_, &c)| c)?;

        if (max_count as f64) <= self.config.balance_ratio * min_count as f64 {
            return None;
        }

        Some(Insight {
            id: Uuid::new_v4(),
            kind: InsightKind::Behavior,
            title: "Study balance is skewed".to_string(),
            description: format!(
                "{} activity ({} events) is crowding out {} ({} events) over the last week",
                max_track.as_str(),
                max_count,
                min_track.as_str(),
                min_count
            ),
            impact: Impact::Medium,
            actionable: true,
            created_at: now,
            expires_at: now + self.config.balance_ttl,
        })
    }

    /// Timing: mean study hour falls outside the effective bands
    fn timing_insight(&self, recent: &[&ActivityEvent], now: DateTime<Utc>) -> Option<Insight> {
        let hours: Vec<f64> = recent.iter().map(|e| e.timestamp.hour() as f64).collect();
        let mean_hour = mean(&hours)?;

        let in_band = self
            .config
            .preferred_hours
            .iter()
            .any(|&(start, end)| mean_hour >= start as f64 && mean_hour <= end as f64);
        if in_band {
            return None;
        }

        Some(Insight {
            id: Uuid::new_v4(),
            kind: InsightKind::Behavior,
            title: "Study sessions fall outside effective hours".to_string(),
            description: format!(
                "Average study time centers around {:.0}:00; sessions in the morning or \
                 mid-afternoon bands tend to be more effective",
                mean_hour
            ),
            impact: Impact::Medium,
            actionable: true,
            created_at: now,
            expires_at: now + self.config.timing_ttl,
        })
    }

    /// Efficiency: score earned per minute spent is below the floor
    fn efficiency_insight(&self, recent: &[&ActivityEvent], now: DateTime<Utc>) -> Option<Insight> {
        let ratios: Vec<f64> = recent
            .iter()
            .filter_map(|e| match (e.score(), e.time_spent_minutes()) {
                (Some(score), Some(minutes)) if minutes > 0.0 => Some(score / minutes),
                _ => None,
            })
            .collect();

        if ratios.len() < self.config.min_efficiency_samples {
            return None;
        }

        let avg = mean(&ratios)?;
        if avg >= self.config.efficiency_floor {
            return None;
        }

        Some(Insight {
            id: Uuid::new_v4(),
            kind: InsightKind::Efficiency,
            title: "Low scoring efficiency".to_string(),
            description: format!(
                "Average of {:.2} points per minute across {} timed activities; shorter, \
                 focused sessions may help",
                avg,
                ratios.len()
            ),
            impact: Impact::High,
            actionable: true,
            created_at: now,
            expires_at: now + self.config.efficiency_ttl,
        })
    }
}
