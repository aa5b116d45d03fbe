//! Anomaly detector
//!
//! Compares recent values against a trailing historical baseline to flag
//! sudden drops. Anomalies are ephemeral: they are returned on the flush
//! report for the pass that detected them and are not stored.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::{ActivityEvent, TrackCategory};
use crate::stats::mean;

/// Kind of deviation detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Latest test score fell well below the trailing average
    PerformanceDrop,
    /// Activity volume collapsed versus the preceding day
    ActivityDrop,
}

/// Severity of a detected anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    High,
    Medium,
}

/// A detected deviation from a user's trailing baseline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    /// Kind of deviation
    pub kind: AnomalyKind,

    /// Severity level
    pub severity: AnomalySeverity,

    /// Human-readable summary
    pub description: String,

    /// Suggested follow-up actions
    pub recommended_actions: Vec<String>,
}

/// Configuration for the anomaly detector
#[derive(Debug, Clone)]
pub struct AnomalyConfig {
    /// Minimum score samples before the performance check applies
    pub min_score_samples: usize,

    /// A performance drop fires when the last score is strictly below this
    /// fraction of the prior mean
    pub performance_drop_ratio: f64,

    /// An activity drop fires when the trailing window count is strictly
    /// below this fraction of the preceding window count
    pub activity_drop_ratio: f64,

    /// Width of each activity comparison window
    pub activity_window: Duration,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            min_score_samples: 3,
            performance_drop_ratio: 0.70,
            activity_drop_ratio: 0.30,
            activity_window: Duration::hours(24),
        }
    }
}

/// Runs the two independent, non-exclusive per-user checks
#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl AnomalyDetector {
    /// Create a detector with the given configuration
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    /// Detect anomalies in one user's time-ordered history
    pub fn detect(&self, history: &[ActivityEvent], now: DateTime<Utc>) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();

        if let Some(anomaly) = self.performance_drop(history) {
            anomalies.push(anomaly);
        }
        if let Some(anomaly) = self.activity_drop(history, now) {
            anomalies.push(anomaly);
        }

        if !anomalies.is_empty() {
            debug!(count = anomalies.len(), "anomalies detected");
        }
        anomalies
    }

    /// Last score strictly below `ratio x mean(all prior scores)`
    ///
    /// A score exactly at the threshold does not fire.
    fn performance_drop(&self, history: &[ActivityEvent]) -> Option<Anomaly> {
        let scores: Vec<f64> = history
            .iter()
            .filter(|e| e.track == TrackCategory::Exam)
            .filter_map(|e| e.score())
            .collect();

        if scores.len() < self.config.min_score_samples {
            return None;
        }

        let (&last, priors) = scores.split_last()?;
        let prior_mean = mean(priors)?;
        let threshold = self.config.performance_drop_ratio * prior_mean;

        if last >= threshold {
            return None;
        }

        Some(Anomaly {
            kind: AnomalyKind::PerformanceDrop,
            severity: AnomalySeverity::High,
            description: format!(
                "Latest score {last:.0} is below {:.0}% of the prior average {prior_mean:.0}",
                self.config.performance_drop_ratio * 100.0
            ),
            recommended_actions: vec![
                "Review the most recent test".to_string(),
                "Check for fatigue or gaps in preparation".to_string(),
            ],
        })
    }

    /// Trailing-window event count strictly below `ratio x` the preceding
    /// window's count
    fn activity_drop(&self, history: &[ActivityEvent], now: DateTime<Utc>) -> Option<Anomaly> {
        let window = self.config.activity_window;
        let recent_start = now - window;
        let prior_start = now - window - window;

        let recent = history
            .iter()
            .filter(|e| e.timestamp > recent_start && e.timestamp <= now)
            .count();
        let prior = history
            .iter()
            .filter(|e| e.timestamp > prior_start && e.timestamp <= recent_start)
            .count();

        if prior == 0 {
            return None;
        }
        if (recent as f64) >= self.config.activity_drop_ratio * prior as f64 {
            return None;
        }

        Some(Anomaly {
            kind: AnomalyKind::ActivityDrop,
            severity: AnomalySeverity::Medium,
            description: format!(
                "Activity fell to {recent} events in the last day from {prior} the day before"
            ),
            recommended_actions: vec!["Schedule a short session to keep momentum".to_string()],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn score_history(scores: &[f64], now: DateTime<Utc>) -> Vec<ActivityEvent> {
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
                    now - Duration::hours(2) + Duration::minutes(i as i64),
                )
            })
            .collect()
    }

    fn sessions_at(now: DateTime<Utc>, hours_ago: &[i64]) -> Vec<ActivityEvent> {
        hours_ago
            .iter()
            .map(|&h| {
                ActivityEvent::at(
                    "u1",
                    TrackCategory::Exam,
                    EventKind::SessionLogged,
                    now - Duration::hours(h),
                )
            })
            .collect()
    }

    #[test]
    fn test_performance_drop_strict_boundary() {
        let detector = AnomalyDetector::default();
        let now = Utc::now();

        // priors [80, 80, 80], mean 80, threshold 56: exactly 56 must not
        // fire
        let at_threshold = score_history(&[80.0, 80.0, 80.0, 56.0], now);
        assert!(detector.detect(&at_threshold, now).is_empty());

        // 55 is strictly below and must fire
        let below = score_history(&[80.0, 80.0, 80.0, 55.0], now);
        let anomalies = detector.detect(&below, now);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::PerformanceDrop);
        assert_eq!(anomalies[0].severity, AnomalySeverity::High);
    }

    #[test]
    fn test_performance_drop_needs_three_samples() {
        let detector = AnomalyDetector::default();
        let now = Utc::now();

        let history = score_history(&[80.0, 10.0], now);
        assert!(detector.detect(&history, now).is_empty());
    }

    #[test]
    fn test_activity_drop_fires_on_collapse() {
        let detector = AnomalyDetector::default();
        let now = Utc::now();

        // 10 events 24-48h ago, 1 event in the last 24h: 1 < 0.3 * 10
        let mut history = sessions_at(now, &[26, 27, 28, 29, 30, 31, 32, 33, 34, 35]);
        history.extend(sessions_at(now, &[2]));

        let anomalies = detector.detect(&history, now);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::ActivityDrop);
        assert_eq!(anomalies[0].severity, AnomalySeverity::Medium);
    }

    #[test]
    fn test_activity_drop_strict_boundary() {
        let detector = AnomalyDetector::default();
        let now = Utc::now();

        // 10 prior, 3 recent: 3 is exactly 0.3 * 10 and must not fire
        let mut history = sessions_at(now, &[26, 27, 28, 29, 30, 31, 32, 33, 34, 35]);
        history.extend(sessions_at(now, &[1, 2, 3]));

        assert!(detector.detect(&history, now).is_empty());
    }

    #[test]
    fn test_activity_drop_quiet_without_prior_window() {
        let detector = AnomalyDetector::default();
        let now = Utc::now();

        // No events in the 24-48h window at all
        let history = sessions_at(now, &[1, 2]);
        assert!(detector.detect(&history, now).is_empty());
    }

    #[test]
    fn test_checks_are_independent() {
        let detector = AnomalyDetector::default();
        let now = Utc::now();

        // A plunging score series with healthy activity volume: only the
        // performance check fires
        let mut history = sessions_at(now, &[26, 27, 28, 29, 30, 31, 32, 33, 34, 35]);
        history.extend(score_history(&[80.0, 80.0, 80.0, 20.0], now));

        let anomalies = detector.detect(&history, now);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::PerformanceDrop);
    }
}
