//! Persistence seam
//!
//! An upstream collaborator is expected to durably store events, patterns
//! and insights. Here it is a side effect only: a sink failure for one user
//! is logged and swallowed, never rolls back in-memory results, and never
//! blocks later flushes.

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::event::ActivityEvent;
use crate::insights::Insight;
use crate::patterns::Pattern;

/// Durable-store writes issued per user after in-memory updates
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Persist a user's raw sub-batch
    async fn persist_events(&self, user_id: &str, events: &[ActivityEvent]) -> EngineResult<()>;

    /// Persist a user's surfaced patterns for this pass
    async fn persist_patterns(&self, user_id: &str, patterns: &[Pattern]) -> EngineResult<()>;

    /// Persist a user's newly generated insights
    async fn persist_insights(&self, user_id: &str, insights: &[Insight]) -> EngineResult<()>;
}

/// Default sink: keeps everything in memory only
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl PersistenceSink for NoopSink {
    async fn persist_events(&self, _user_id: &str, _events: &[ActivityEvent]) -> EngineResult<()> {
        Ok(())
    }

    async fn persist_patterns(&self, _user_id: &str, _patterns: &[Pattern]) -> EngineResult<()> {
        Ok(())
    }

    async fn persist_insights(&self, _user_id: &str, _insights: &[Insight]) -> EngineResult<()> {
        Ok(())
    }
}
