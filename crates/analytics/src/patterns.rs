//! Pattern recognizer
//!
//! Computes normalized trend signatures per track category from a single
//! user's sub-batch and classifies them into pattern types with confidence
//! scores. Patterns are ephemeral: they are recomputed on every processing
//! pass and never persisted across passes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::event::{ActivityEvent, TrackCategory};
use crate::stats::{mean, normalized_trend};

/// Configuration for the pattern recognizer
#[derive(Debug, Clone)]
pub struct PatternConfig {
    /// Normalized trend above which a series classifies as improvement
    pub improvement_threshold: f64,

    /// Normalized trend below which (negated) a series classifies as decline
    pub decline_threshold: f64,

    /// Mean completion rate above which a course track is a breakthrough
    pub course_excellence_bar: f64,

    /// Mean effectiveness above which cross-track work is a breakthrough
    pub cross_track_excellence_bar: f64,

    /// Patterns below this confidence are discarded before being returned
    pub confidence_floor: f64,

    /// Minimum samples for a trend classification
    pub min_trend_samples: usize,

    /// Minimum samples for a plateau classification
    pub min_plateau_samples: usize,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            improvement_threshold: 0.10,
            decline_threshold: 0.05,
            course_excellence_bar: 0.85,
            cross_track_excellence_bar: 0.70,
            confidence_floor: 0.6,
            min_trend_samples: 2,
            min_plateau_samples: 3,
        }
    }
}

/// Trend classification of a metric series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Metric is trending up
    Improvement,
    /// Metric is trending down
    Decline,
    /// Metric is flat with enough samples to say so
    Plateau,
    /// Quality metric holds above the excellence bar
    Breakthrough,
}

impl PatternKind {
    /// String tag used in titles and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Improvement => "improvement",
            PatternKind::Decline => "decline",
            PatternKind::Plateau => "plateau",
            PatternKind::Breakthrough => "breakthrough",
        }
    }
}

/// A detected trend with an associated confidence score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    /// Unique identifier for this pattern
    pub id: Uuid,

    /// Trend classification
    pub kind: PatternKind,

    /// Confidence in the classification, always in [0, 1]
    pub confidence: f64,

    /// Human-readable summary
    pub description: String,

    /// Suggested follow-up actions
    pub recommended_actions: Vec<String>,

    /// Tracks this pattern applies to
    pub applicable_tracks: Vec<TrackCategory>,

    /// When the pattern was detected
    pub detected_at: DateTime<Utc>,
}

/// Recognizes trend patterns in a user's sub-batch
#[derive(Debug, Clone, Default)]
pub struct PatternRecognizer {
    config: PatternConfig,
}

impl PatternRecognizer {
    /// Create a recognizer with the given configuration
    pub fn new(config: PatternConfig) -> Self {
        Self { config }
    }

    /// Recognize patterns in a single user's time-ordered sub-batch
    ///
    /// Returns only patterns at or above the confidence floor; every
    /// returned confidence lies in [0, 1].
    pub fn recognize(&self, events: &[ActivityEvent]) -> Vec<Pattern> {
        let mut patterns = Vec::new();

        for track in TrackCategory::ALL {
            let series = Self::metric_series(events, track);
            trace!(track = track.as_str(), samples = series.len(), "metric series");

            if let Some(pattern) = self.classify(track, &series) {
                debug!(
                    track = track.as_str(),
                    kind = pattern.kind.as_str(),
                    confidence = pattern.confidence,
                    "pattern detected"
                );
                patterns.push(pattern);
            }
        }

        patterns.retain(|p| p.confidence >= self.config.confidence_floor);
        patterns
    }

    /// Extract the relevant metric series for a track, in event order
    fn metric_series(events: &[ActivityEvent], track: TrackCategory) -> Vec<f64> {
        events
            .iter()
            .filter(|e| e.track == track)
            .filter_map(|e| match track {
                TrackCategory::Exam => e.score(),
                TrackCategory::CourseTech => e.completion_rate(),
                TrackCategory::CrossTrack => e.effectiveness(),
            })
            .collect()
    }

    /// Classify a metric series for one track
    ///
    /// Improvement and decline take precedence over breakthrough and plateau
    /// when more than one classification could apply.
    fn classify(&self, track: TrackCategory, series: &[f64]) -> Option<Pattern> {
        if series.len() < self.config.min_trend_samples {
            return None;
        }

        let trend = normalized_trend(series);

        if trend > self.config.improvement_threshold {
            let confidence = (0.6 + trend).min(0.95);
            return Some(self.pattern(
                PatternKind::Improvement,
                confidence,
                track,
                format!(
                    "{} performance is improving ({:+.1}% per activity)",
                    track.as_str(),
                    trend * 100.0
                ),
                vec![
                    "Keep the current study cadence".to_string(),
                    "Raise difficulty gradually".to_string(),
                ],
            ));
        }

        if trend < -self.config.decline_threshold {
            let confidence = (0.6 + trend.abs()).min(0.90);
            return Some(self.pattern(
                PatternKind::Decline,
                confidence,
                track,
                format!(
                    "{} performance is declining ({:+.1}% per activity)",
                    track.as_str(),
                    trend * 100.0
                ),
                vec![
                    "Revisit recent material".to_string(),
                    "Shorten sessions and review fundamentals".to_string(),
                ],
            ));
        }

        // No strong trend: check the excellence bar, then plateau.
        // A mildly negative trend rules out a breakthrough.
        if trend >= 0.0 {
            if let Some(breakthrough) = self.classify_breakthrough(track, series) {
                return Some(breakthrough);
            }
        }

        if series.len() >= self.config.min_plateau_samples {
            return Some(self.pattern(
                PatternKind::Plateau,
                0.65,
                track,
                format!("{} performance is holding steady", track.as_str()),
                vec!["Introduce new material to break the plateau".to_string()],
            ));
        }

        None
    }

    fn classify_breakthrough(&self, track: TrackCategory, series: &[f64]) -> Option<Pattern> {
        let avg = mean(series)?;
        let (bar, confidence) = match track {
            TrackCategory::CourseTech => (self.config.course_excellence_bar, 0.85),
            TrackCategory::CrossTrack => (self.config.cross_track_excellence_bar, 0.80),
            TrackCategory::Exam => return None,
        };

        if avg > bar {
            return Some(self.pattern(
                PatternKind::Breakthrough,
                confidence,
                track,
                format!(
                    "{} quality holds above {:.0}% (average {:.0}%)",
                    track.as_str(),
                    bar * 100.0,
                    avg * 100.0
                ),
                vec!["Advance to the next difficulty tier".to_string()],
            ));
        }

        None
    }

    fn pattern(
        &self,
        kind: PatternKind,
        confidence: f64,
        track: TrackCategory,
        description: String,
        recommended_actions: Vec<String>,
    ) -> Pattern {
        Pattern {
            id: Uuid::new_v4(),
            kind,
            confidence: confidence.clamp(0.0, 1.0),
            description,
            recommended_actions,
            applicable_tracks: vec![track],
            detected_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use chrono::Duration;

    fn score_events(scores: &[f64]) -> Vec<ActivityEvent> {
        let base = Utc::now() - Duration::hours(1);
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

    fn rate_events(rates: &[f64]) -> Vec<ActivityEvent> {
        let base = Utc::now() - Duration::hours(1);
        rates
            .iter()
            .enumerate()
            .map(|(i, &completion_rate)| {
                ActivityEvent::at(
                    "u1",
                    TrackCategory::CourseTech,
                    EventKind::LessonCompleted {
                        completion_rate,
                        time_spent_minutes: None,
                    },
                    base + Duration::minutes(i as i64),
                )
            })
            .collect()
    }

    #[test]
    fn test_improvement_classification() {
        let recognizer = PatternRecognizer::default();
        let patterns = recognizer.recognize(&score_events(&[1.0, 2.0, 3.0, 4.0, 5.0]));

        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].kind, PatternKind::Improvement);
        // normalized trend 1/3, confidence 0.6 + 1/3
        assert!((patterns[0].confidence - (0.6 + 1.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_decline_classification() {
        let recognizer = PatternRecognizer::default();
        let patterns = recognizer.recognize(&score_events(&[90.0, 70.0, 50.0, 30.0]));

        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].kind, PatternKind::Decline);
        // normalized trend -1/3, so 0.6 + 1/3 hits the 0.90 decline cap
        assert!((patterns[0].confidence - 0.90).abs() < 1e-9);
    }

    #[test]
    fn test_improvement_confidence_capped() {
        let recognizer = PatternRecognizer::default();
        // Steep rise: normalized trend well above 0.35
        let patterns = recognizer.recognize(&score_events(&[1.0, 20.0, 60.0, 99.0]));
        assert_eq!(patterns[0].kind, PatternKind::Improvement);
        assert!((patterns[0].confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_plateau_classification() {
        let recognizer = PatternRecognizer::default();
        let patterns = recognizer.recognize(&score_events(&[70.0, 71.0, 70.0, 70.0]));

        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].kind, PatternKind::Plateau);
    }

    #[test]
    fn test_breakthrough_on_course_completion() {
        let recognizer = PatternRecognizer::default();
        let patterns = recognizer.recognize(&rate_events(&[0.9, 0.92, 0.91]));

        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].kind, PatternKind::Breakthrough);
        assert!((patterns[0].confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_decline_takes_precedence_over_breakthrough() {
        let recognizer = PatternRecognizer::default();
        // High average but clearly falling
        let patterns = recognizer.recognize(&rate_events(&[1.0, 0.95, 0.85, 0.75]));

        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].kind, PatternKind::Decline);
    }

    #[test]
    fn test_mild_negative_trend_blocks_breakthrough() {
        let recognizer = PatternRecognizer::default();
        // Average above the bar but trend slightly negative: plateau, not
        // breakthrough
        let patterns = recognizer.recognize(&rate_events(&[0.91, 0.90, 0.90, 0.89]));

        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].kind, PatternKind::Plateau);
    }

    #[test]
    fn test_insufficient_samples_yield_nothing() {
        let recognizer = PatternRecognizer::default();
        assert!(recognizer.recognize(&score_events(&[95.0])).is_empty());
        assert!(recognizer.recognize(&[]).is_empty());
    }

    #[test]
    fn test_confidence_bounds() {
        let recognizer = PatternRecognizer::default();
        for series in [
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            vec![90.0, 70.0, 50.0, 30.0],
            vec![1.0, 50.0, 99.0],
            vec![70.0, 70.0, 70.0],
        ] {
            for pattern in recognizer.recognize(&score_events(&series)) {
                assert!(pattern.confidence >= 0.6 && pattern.confidence <= 1.0);
            }
        }
    }
}
