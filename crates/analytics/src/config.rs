//! Engine configuration
//!
//! Component thresholds live with their components; this module aggregates
//! them with the scheduling and resource knobs of the engine itself.

use std::time::Duration;

use crate::anomaly::AnomalyConfig;
use crate::insights::InsightConfig;
use crate::patterns::PatternConfig;

/// Top-level configuration for an [`AnalyticsEngine`](crate::AnalyticsEngine)
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Period of the flush timer
    pub flush_interval: Duration,

    /// Queue length past which an immediate out-of-band flush is signalled
    pub queue_high_watermark: usize,

    /// Time budget for one user's pipeline; expiry is a caught failure
    pub user_pipeline_timeout: Duration,

    /// Trailing per-user event history kept for heuristics and baselines
    pub history_window: Duration,

    /// Hard cap on retained history events per user
    pub history_max_events: usize,

    /// Buffer size of the flush-report channel
    pub report_buffer_size: usize,

    /// Pattern recognizer thresholds
    pub patterns: PatternConfig,

    /// Insight generator thresholds and lifetimes
    pub insights: InsightConfig,

    /// Anomaly detector thresholds
    pub anomaly: AnomalyConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(2),
            queue_high_watermark: 50,
            user_pipeline_timeout: Duration::from_secs(5),
            history_window: Duration::from_secs(7 * 24 * 60 * 60),
            history_max_events: 1000,
            report_buffer_size: 64,
            patterns: PatternConfig::default(),
            insights: InsightConfig::default(),
            anomaly: AnomalyConfig::default(),
        }
    }
}
