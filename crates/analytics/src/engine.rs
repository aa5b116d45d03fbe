//! Analytics engine
//!
//! The explicit context object that owns all state: ingestion queue, results
//! store, per-user history, recognizer, models, detector, generator and the
//! persistence sink. Multiple engines can coexist (tests, tenants) and tear
//! down deterministically; there are no module-level registries.
//!
//! One flush runs at a time. `tick()` is the caller-driven entry point; the
//! scheduler module drives it from a timer for deployments that want a
//! background task.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::anomaly::{Anomaly, AnomalyDetector};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::event::ActivityEvent;
use crate::insights::{Insight, InsightGenerator};
use crate::patterns::{Pattern, PatternRecognizer};
use crate::persistence::{NoopSink, PersistenceSink};
use crate::predictions::{Prediction, PredictionRegistry};
use crate::queue::EventQueue;
use crate::store::ResultsStore;

/// Everything one user's pipeline produced in one pass
#[derive(Debug, Clone, Serialize)]
pub struct UserOutcome {
    /// User this outcome belongs to
    pub user_id: String,

    /// Surfaced patterns (confidence >= floor)
    pub patterns: Vec<Pattern>,

    /// Newly generated insights
    pub insights: Vec<Insight>,

    /// Recomputed predictions across all models
    pub predictions: Vec<Prediction>,

    /// Anomalies detected this pass (ephemeral, not stored)
    pub anomalies: Vec<Anomaly>,
}

/// A per-user pipeline failure, caught at the user boundary
#[derive(Debug, Clone, Serialize)]
pub struct UserFailure {
    /// User whose pipeline failed
    pub user_id: String,

    /// Error kind tag
    pub kind: String,

    /// Error message
    pub message: String,
}

/// Summary of one complete drain-and-process cycle
#[derive(Debug, Clone, Serialize)]
pub struct FlushReport {
    /// When the flush completed
    pub flushed_at: DateTime<Utc>,

    /// Events drained from the queue for this batch
    pub events: usize,

    /// Distinct users in the batch
    pub users: usize,

    /// Per-user results, for users whose pipeline completed
    pub outcomes: Vec<UserOutcome>,

    /// Per-user failures; never abort other users
    pub failures: Vec<UserFailure>,
}

/// Operational counters for the engine
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    /// Events accepted by `enqueue`
    pub events_enqueued: u64,

    /// Events drained into batches
    pub events_processed: u64,

    /// Completed flushes
    pub flushes_completed: u64,

    /// Ticks skipped because a flush was already running
    pub ticks_skipped: u64,

    /// Ticks that found an empty queue
    pub empty_ticks: u64,

    /// User sub-batches processed to completion
    pub users_processed: u64,

    /// User sub-batches that failed or timed out
    pub user_failures: u64,

    /// Patterns surfaced across all passes
    pub patterns_detected: u64,

    /// Insights generated across all passes
    pub insights_generated: u64,

    /// Prediction entries written across all passes
    pub predictions_updated: u64,

    /// Anomalies detected across all passes
    pub anomalies_detected: u64,

    /// Completion time of the most recent flush
    pub last_flush_at: Option<DateTime<Utc>>,
}

/// Shared state handed to per-user pipeline tasks
struct EngineInner {
    config: EngineConfig,
    queue: EventQueue,
    store: ResultsStore,
    history: DashMap<String, Vec<ActivityEvent>>,
    recognizer: PatternRecognizer,
    generator: InsightGenerator,
    detector: AnomalyDetector,
    registry: PredictionRegistry,
    sink: Arc<dyn PersistenceSink>,
    stats: StdMutex<EngineStats>,
}

impl EngineInner {
    /// Run the full pipeline for one user's sub-batch
    ///
    /// Persistence failures are logged and swallowed; in-memory results
    /// written before any failure are kept.
    async fn process_user(
        self: &Arc<Self>,
        user_id: &str,
        mut events: Vec<ActivityEvent>,
    ) -> EngineResult<UserOutcome> {
        events.sort_by_key(|e| e.timestamp);

        if let Err(err) = self.sink.persist_events(user_id, &events).await {
            warn!(user_id, error = %err, "event persistence failed");
        }

        let now = Utc::now();
        let history = self.update_history(user_id, &events, now);

        let patterns = self.recognizer.recognize(&events);
        let insights = self.generator.generate(&patterns, &history, now);
        let updates = self.registry.refresh(user_id, &history);
        let anomalies = self.detector.detect(&history, now);

        self.store.replace_patterns(user_id, patterns.clone());
        self.store.append_insights(user_id, insights.clone());
        for update in &updates {
            self.store.apply_model_update(update, now);
        }

        if let Err(err) = self.sink.persist_patterns(user_id, &patterns).await {
            warn!(user_id, error = %err, "pattern persistence failed");
        }
        if let Err(err) = self.sink.persist_insights(user_id, &insights).await {
            warn!(user_id, error = %err, "insight persistence failed");
        }

        let predictions: Vec<Prediction> = updates
            .iter()
            .flat_map(|update| {
                update.entries.iter().map(|(key, value)| Prediction {
                    model: update.model_id.clone(),
                    key: key.clone(),
                    value: *value,
                })
            })
            .collect();

        {
            let mut stats = self.stats.lock().expect("stats lock poisoned");
            stats.patterns_detected += patterns.len() as u64;
            stats.insights_generated += insights.len() as u64;
            stats.predictions_updated += predictions.len() as u64;
            stats.anomalies_detected += anomalies.len() as u64;
        }

        Ok(UserOutcome {
            user_id: user_id.to_string(),
            patterns,
            insights,
            predictions,
            anomalies,
        })
    }

    /// Append a sorted sub-batch to the user's trailing history
    ///
    /// History is trimmed to the configured window and hard event cap, and
    /// returned as a snapshot for this pass. Only this user's single worker
    /// touches the entry during a flush, and flushes never overlap.
    fn update_history(
        &self,
        user_id: &str,
        events: &[ActivityEvent],
        now: DateTime<Utc>,
    ) -> Vec<ActivityEvent> {
        let window = chrono::Duration::from_std(self.config.history_window)
            .unwrap_or_else(|_| chrono::Duration::days(7));
        let cutoff = now - window;

        let mut entry = self.history.entry(user_id.to_string()).or_default();
        entry.extend(events.iter().cloned());
        entry.sort_by_key(|e| e.timestamp);
        entry.retain(|e| e.timestamp > cutoff);

        let cap = self.config.history_max_events;
        if entry.len() > cap {
            let excess = entry.len() - cap;
            entry.drain(..excess);
        }

        entry.clone()
    }
}

/// Real-time learning-analytics processing engine
///
/// See the crate docs for the full pipeline; in short: `enqueue` feeds the
/// queue, `tick` drains and processes one batch, and the query accessors
/// read the in-memory results store.
pub struct AnalyticsEngine {
    inner: Arc<EngineInner>,
    flush_guard: tokio::sync::Mutex<()>,
    report_tx: mpsc::Sender<FlushReport>,
    report_rx: StdMutex<Option<mpsc::Receiver<FlushReport>>>,
}

impl AnalyticsEngine {
    /// Create an engine with the given configuration and no persistence
    pub fn new(config: EngineConfig) -> Self {
        AnalyticsEngineBuilder::new().config(config).build()
    }

    /// Create an engine with defaults everywhere
    pub fn with_defaults() -> Self {
        AnalyticsEngineBuilder::new().build()
    }

    /// Builder for custom sinks, models and thresholds
    pub fn builder() -> AnalyticsEngineBuilder {
        AnalyticsEngineBuilder::new()
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Enqueue one event; fire-and-forget, no acknowledgement
    ///
    /// No validation happens here: malformed metric fields surface
    /// downstream as insufficient-sample conditions.
    pub fn enqueue(&self, event: ActivityEvent) {
        {
            let mut stats = self.inner.stats.lock().expect("stats lock poisoned");
            stats.events_enqueued += 1;
        }
        self.inner.queue.push(event);
    }

    /// Number of events currently buffered
    pub fn queued_events(&self) -> usize {
        self.inner.queue.len()
    }

    /// Notifier signalled when the queue passes its high-watermark
    pub fn queue_overflow(&self) -> &tokio::sync::Notify {
        self.inner.queue.overflow()
    }

    /// Attempt one drain-and-process cycle
    ///
    /// At most one flush runs at a time: a tick arriving during an active
    /// flush is a no-op and its events remain queued for the next successful
    /// tick. Returns `None` for a skipped tick or an empty queue.
    pub async fn tick(&self) -> Option<FlushReport> {
        let _guard = match self.flush_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                let mut stats = self.inner.stats.lock().expect("stats lock poisoned");
                stats.ticks_skipped += 1;
                debug!("flush already in progress, tick skipped");
                return None;
            }
        };

        let batch = self.inner.queue.drain();
        if batch.is_empty() {
            let mut stats = self.inner.stats.lock().expect("stats lock poisoned");
            stats.empty_ticks += 1;
            return None;
        }

        let report = self.flush(batch).await;

        // Report delivery is best-effort: a missing or slow consumer never
        // blocks the flush cycle.
        if let Err(err) = self.report_tx.try_send(report.clone()) {
            debug!(error = %err, "flush report dropped");
        }

        Some(report)
    }

    /// Process one drained batch, partitioned by user
    async fn flush(&self, batch: Vec<ActivityEvent>) -> FlushReport {
        let event_count = batch.len();
        let timeout = self.inner.config.user_pipeline_timeout;

        let mut partitions: HashMap<String, Vec<ActivityEvent>> = HashMap::new();
        for event in batch {
            partitions
                .entry(event.user_id.clone())
                .or_default()
                .push(event);
        }
        let user_count = partitions.len();

        // Per-user pipelines run concurrently, one worker per user, each
        // bounded by the pipeline timeout.
        let mut handles = Vec::with_capacity(user_count);
        for (user_id, events) in partitions {
            let inner = Arc::clone(&self.inner);
            let task_user = user_id.clone();
            let handle = tokio::spawn(async move {
                match tokio::time::timeout(timeout, inner.process_user(&task_user, events)).await {
                    Ok(result) => result,
                    Err(_) => Err(EngineError::Timeout {
                        user_id: task_user,
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                }
            });
            handles.push((user_id, handle));
        }

        let mut outcomes = Vec::new();
        let mut failures = Vec::new();
        for (user_id, handle) in handles {
            match handle.await {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(err)) => {
                    warn!(user_id = %user_id, error = %err, "user pipeline failed");
                    failures.push(UserFailure {
                        user_id,
                        kind: err.kind().to_string(),
                        message: err.to_string(),
                    });
                }
                Err(join_err) => {
                    warn!(user_id = %user_id, error = %join_err, "user pipeline panicked");
                    failures.push(UserFailure {
                        user_id,
                        kind: "transient".to_string(),
                        message: join_err.to_string(),
                    });
                }
            }
        }

        let flushed_at = Utc::now();
        {
            let mut stats = self.inner.stats.lock().expect("stats lock poisoned");
            stats.events_processed += event_count as u64;
            stats.flushes_completed += 1;
            stats.users_processed += outcomes.len() as u64;
            stats.user_failures += failures.len() as u64;
            stats.last_flush_at = Some(flushed_at);
        }

        info!(
            events = event_count,
            users = user_count,
            failures = failures.len(),
            "flush completed"
        );

        FlushReport {
            flushed_at,
            events: event_count,
            users: user_count,
            outcomes,
            failures,
        }
    }

    /// Stream of flush reports; can be taken once
    pub fn reports(&self) -> Option<ReceiverStream<FlushReport>> {
        self.report_rx
            .lock()
            .expect("report receiver lock poisoned")
            .take()
            .map(ReceiverStream::new)
    }

    /// Unexpired insights for a user, highest impact first
    pub fn user_insights(&self, user_id: &str) -> Vec<Insight> {
        self.inner.store.user_insights(user_id)
    }

    /// A user's latest-pass patterns, highest confidence first
    pub fn user_patterns(&self, user_id: &str) -> Vec<Pattern> {
        self.inner.store.user_patterns(user_id)
    }

    /// Union of all model entries keyed by this user
    pub fn user_predictions(&self, user_id: &str) -> Vec<Prediction> {
        self.inner.store.user_predictions(user_id)
    }

    /// Current operational counters
    pub fn stats(&self) -> EngineStats {
        self.inner.stats.lock().expect("stats lock poisoned").clone()
    }
}

/// Builder for [`AnalyticsEngine`]
pub struct AnalyticsEngineBuilder {
    config: EngineConfig,
    sink: Arc<dyn PersistenceSink>,
    registry: PredictionRegistry,
}

impl Default for AnalyticsEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyticsEngineBuilder {
    /// Start from default configuration, no persistence, standard models
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            sink: Arc::new(NoopSink),
            registry: PredictionRegistry::default(),
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the flush timer period
    pub fn flush_interval(mut self, interval: std::time::Duration) -> Self {
        self.config.flush_interval = interval;
        self
    }

    /// Set the queue high-watermark
    pub fn queue_high_watermark(mut self, watermark: usize) -> Self {
        self.config.queue_high_watermark = watermark;
        self
    }

    /// Set the per-user pipeline time budget
    pub fn user_pipeline_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.user_pipeline_timeout = timeout;
        self
    }

    /// Set the persistence sink
    pub fn sink(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the prediction model set
    pub fn registry(mut self, registry: PredictionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Build the engine
    pub fn build(self) -> AnalyticsEngine {
        let (report_tx, report_rx) = mpsc::channel(self.config.report_buffer_size.max(1));

        let inner = EngineInner {
            queue: EventQueue::new(self.config.queue_high_watermark),
            store: ResultsStore::new(),
            history: DashMap::new(),
            recognizer: PatternRecognizer::new(self.config.patterns.clone()),
            generator: InsightGenerator::new(self.config.insights.clone()),
            detector: AnomalyDetector::new(self.config.anomaly.clone()),
            registry: self.registry,
            sink: self.sink,
            stats: StdMutex::new(EngineStats::default()),
            config: self.config,
        };

        AnalyticsEngine {
            inner: Arc::new(inner),
            flush_guard: tokio::sync::Mutex::new(()),
            report_tx,
            report_rx: StdMutex::new(Some(report_rx)),
        }
    }
}
