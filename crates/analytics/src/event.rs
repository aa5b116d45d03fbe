//! Activity event model
//!
//! Events are immutable once enqueued and belong to exactly one user and one
//! track category. The payload is a tagged union per event type rather than a
//! sparse string-keyed map, so a field that is present is always well typed;
//! a metric that is absent (or non-finite) is simply a missing sample.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Learning track a single event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackCategory {
    /// Exam preparation track
    Exam,
    /// Technical course track
    CourseTech,
    /// Cross-track activity (skills applied across tracks)
    CrossTrack,
}

impl TrackCategory {
    /// All track categories, in a stable order
    pub const ALL: [TrackCategory; 3] = [
        TrackCategory::Exam,
        TrackCategory::CourseTech,
        TrackCategory::CrossTrack,
    ];

    /// String tag used in log fields and descriptions
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackCategory::Exam => "exam",
            TrackCategory::CourseTech => "course_tech",
            TrackCategory::CrossTrack => "cross_track",
        }
    }
}

/// Payload of an activity event, one variant per event type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A practice or mock test was completed
    TestCompleted {
        /// Score in [0, 100]
        score: f64,
        /// Minutes spent on the test, if tracked
        time_spent_minutes: Option<f64>,
    },

    /// A course lesson was completed
    LessonCompleted {
        /// Fraction of the lesson completed, in [0, 1]
        completion_rate: f64,
        /// Minutes spent on the lesson, if tracked
        time_spent_minutes: Option<f64>,
    },

    /// A skill drill was practiced
    SkillPractice {
        /// Identifier of the practiced skill
        skill_id: String,
        /// Fraction of the drill completed, in [0, 1]
        completion_rate: f64,
    },

    /// Activity that applies one track's skills in another
    CrossTrackActivity {
        /// Self-reported effectiveness rating, in [0, 1]
        effectiveness: f64,
    },

    /// A study session with no metric payload
    SessionLogged,
}

/// A discrete, timestamped, categorized user-activity record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Owning user
    pub user_id: String,

    /// Track this event belongs to
    pub track: TrackCategory,

    /// Typed payload
    pub kind: EventKind,

    /// Event time
    pub timestamp: DateTime<Utc>,
}

/// Keep only finite metric values; NaN and infinities count as missing
fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

impl ActivityEvent {
    /// Create an event with the given payload, timestamped now
    pub fn new(user_id: impl Into<String>, track: TrackCategory, kind: EventKind) -> Self {
        Self {
            user_id: user_id.into(),
            track,
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Same as [`ActivityEvent::new`] with an explicit timestamp
    pub fn at(
        user_id: impl Into<String>,
        track: TrackCategory,
        kind: EventKind,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            track,
            kind,
            timestamp,
        }
    }

    /// Test score carried by this event, if any
    pub fn score(&self) -> Option<f64> {
        match &self.kind {
            EventKind::TestCompleted { score, .. } => finite(*score),
            _ => None,
        }
    }

    /// Completion rate carried by this event, if any
    pub fn completion_rate(&self) -> Option<f64> {
        match &self.kind {
            EventKind::LessonCompleted { completion_rate, .. }
            | EventKind::SkillPractice { completion_rate, .. } => finite(*completion_rate),
            _ => None,
        }
    }

    /// Effectiveness rating carried by this event, if any
    pub fn effectiveness(&self) -> Option<f64> {
        match &self.kind {
            EventKind::CrossTrackActivity { effectiveness } => finite(*effectiveness),
            _ => None,
        }
    }

    /// Minutes spent, if tracked for this event type
    pub fn time_spent_minutes(&self) -> Option<f64> {
        match &self.kind {
            EventKind::TestCompleted {
                time_spent_minutes, ..
            }
            | EventKind::LessonCompleted {
                time_spent_minutes, ..
            } => time_spent_minutes.and_then(finite),
            _ => None,
        }
    }

    /// Skill identifier, for skill-practice events
    pub fn skill_id(&self) -> Option<&str> {
        match &self.kind {
            EventKind::SkillPractice { skill_id, .. } => Some(skill_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_accessors() {
        let event = ActivityEvent::new(
            "u1",
            TrackCategory::Exam,
            EventKind::TestCompleted {
                score: 82.0,
                time_spent_minutes: Some(40.0),
            },
        );
        assert_eq!(event.score(), Some(82.0));
        assert_eq!(event.time_spent_minutes(), Some(40.0));
        assert_eq!(event.completion_rate(), None);
        assert_eq!(event.skill_id(), None);
    }

    #[test]
    fn test_non_finite_values_are_missing_samples() {
        let event = ActivityEvent::new(
            "u1",
            TrackCategory::Exam,
            EventKind::TestCompleted {
                score: f64::NAN,
                time_spent_minutes: Some(f64::INFINITY),
            },
        );
        assert_eq!(event.score(), None);
        assert_eq!(event.time_spent_minutes(), None);
    }

    #[test]
    fn test_completion_rate_from_both_lesson_and_skill() {
        let lesson = ActivityEvent::new(
            "u1",
            TrackCategory::CourseTech,
            EventKind::LessonCompleted {
                completion_rate: 0.9,
                time_spent_minutes: None,
            },
        );
        let drill = ActivityEvent::new(
            "u1",
            TrackCategory::CourseTech,
            EventKind::SkillPractice {
                skill_id: "closures".to_string(),
                completion_rate: 0.7,
            },
        );
        assert_eq!(lesson.completion_rate(), Some(0.9));
        assert_eq!(drill.completion_rate(), Some(0.7));
        assert_eq!(drill.skill_id(), Some("closures"));
    }

    #[test]
    fn test_event_kind_serde_tag() {
        let event = ActivityEvent::new(
            "u1",
            TrackCategory::CrossTrack,
            EventKind::CrossTrackActivity { effectiveness: 0.8 },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["track"], "cross_track");
        assert_eq!(json["kind"]["type"], "cross_track_activity");
    }
}
