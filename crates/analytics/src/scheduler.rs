//! Flush scheduler
//!
//! Background task that drives [`AnalyticsEngine::tick`] from a fixed-period
//! timer, with an out-of-band flush whenever the queue trips its
//! high-watermark. The scheduler owns no state of its own; stopping it stops
//! processing but loses nothing, since queued events survive in the engine.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::engine::AnalyticsEngine;

/// Handle to a running scheduler task
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal shutdown and wait for the final drain to complete
    pub async fn shutdown(self) {
        // Receiver dropping also stops the loop, so send errors are fine
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }

    /// Whether the scheduler task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the flush loop for an engine
///
/// The timer period comes from the engine's `flush_interval`. A tick that
/// lands while a flush is still running is skipped by the engine itself, so
/// missed timer ticks are delayed rather than bursted. On shutdown the loop
/// performs one final drain before exiting.
pub fn spawn(engine: Arc<AnalyticsEngine>) -> SchedulerHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(engine.config().flush_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = engine.config().flush_interval.as_millis() as u64,
            "flush scheduler started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    engine.tick().await;
                }
                _ = engine.queue_overflow().notified() => {
                    debug!("queue over watermark, flushing out of band");
                    engine.tick().await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        // Final drain so events accepted before shutdown are processed
        engine.tick().await;
        info!("flush scheduler stopped");
    });

    SchedulerHandle { shutdown_tx, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::event::{ActivityEvent, EventKind, TrackCategory};
    use chrono::{Duration as ChronoDuration, Utc};
    use std::time::Duration;

    fn score_event(user: &str, score: f64, minutes_ago: i64) -> ActivityEvent {
        ActivityEvent::at(
            user,
            TrackCategory::Exam,
            EventKind::TestCompleted {
                score,
                time_spent_minutes: None,
            },
            Utc::now() - ChronoDuration::minutes(minutes_ago),
        )
    }

    #[tokio::test]
    async fn test_timer_drives_flushes() {
        let engine = Arc::new(AnalyticsEngine::new(EngineConfig {
            flush_interval: Duration::from_millis(20),
            ..EngineConfig::default()
        }));

        for i in 0..5 {
            engine.enqueue(score_event("u1", 60.0 + i as f64 * 5.0, 5 - i));
        }

        let handle = spawn(engine.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.shutdown().await;

        assert!(engine.stats().flushes_completed >= 1);
        assert_eq!(engine.stats().events_processed, 5);
        assert!(!engine.user_patterns("u1").is_empty());
    }

    #[tokio::test]
    async fn test_watermark_flushes_out_of_band() {
        // Timer far in the future: only the watermark can trigger a flush
        let engine = Arc::new(AnalyticsEngine::new(EngineConfig {
            flush_interval: Duration::from_secs(3600),
            queue_high_watermark: 2,
            ..EngineConfig::default()
        }));

        let handle = spawn(engine.clone());
        // Let the scheduler pass its immediate first tick on an empty queue
        tokio::time::sleep(Duration::from_millis(20)).await;

        for i in 0..3 {
            engine.enqueue(score_event("u1", 70.0, 3 - i));
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(engine.queued_events(), 0);
        assert_eq!(engine.stats().events_processed, 3);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_pending_events() {
        let engine = Arc::new(AnalyticsEngine::new(EngineConfig {
            flush_interval: Duration::from_secs(3600),
            ..EngineConfig::default()
        }));

        let handle = spawn(engine.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;

        engine.enqueue(score_event("u1", 80.0, 1));
        handle.shutdown().await;

        assert_eq!(engine.queued_events(), 0);
        assert_eq!(engine.stats().events_processed, 1);
    }
}
