//! Real-time learning analytics engine
//!
//! This crate turns raw learner activity events into patterns, insights,
//! predictions and anomalies. Events are buffered in an in-process queue,
//! drained in batches by a flush cycle (timer-driven or caller-driven),
//! partitioned per user and run through the analysis pipeline, with results
//! served from an in-memory store.

pub mod anomaly;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod insights;
pub mod patterns;
pub mod persistence;
pub mod predictions;
pub mod queue;
pub mod scheduler;
pub mod stats;
pub mod store;

// Re-export commonly used types
pub use engine::{
    AnalyticsEngine, AnalyticsEngineBuilder, EngineStats, FlushReport, UserFailure, UserOutcome,
};

pub use event::{ActivityEvent, EventKind, TrackCategory};

pub use config::EngineConfig;

pub use error::{EngineError, EngineResult};

pub use patterns::{Pattern, PatternConfig, PatternKind, PatternRecognizer};

pub use insights::{Impact, Insight, InsightConfig, InsightGenerator, InsightKind};

pub use predictions::{
    CompletionTimeModel, ExamSuccessModel, ModelKind, ModelSnapshot, ModelUpdate, Prediction,
    PredictionModel, PredictionRegistry, SkillMasteryModel,
};

pub use anomaly::{Anomaly, AnomalyConfig, AnomalyDetector, AnomalyKind, AnomalySeverity};

pub use queue::EventQueue;

pub use store::ResultsStore;

pub use persistence::{NoopSink, PersistenceSink};

pub use scheduler::SchedulerHandle;
