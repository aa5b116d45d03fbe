//! Event ingestion queue
//!
//! An unbounded in-process buffer with no dedup and no cross-caller ordering
//! guarantee. Enqueueing performs no validation: malformed metric fields are
//! handled downstream as insufficient-sample conditions, never as hard
//! errors.
//!
//! The queue is the only shared mutable resource on the producer side. The
//! buffer lock is a plain `std::sync::Mutex` held only for the push or the
//! swap, never across an `.await`, so the drain is an atomic copy-and-clear.

use std::sync::Mutex;
use tokio::sync::Notify;
use tracing::trace;

use crate::event::ActivityEvent;

/// In-process ingestion buffer with a high-watermark flush signal
pub struct EventQueue {
    buffer: Mutex<Vec<ActivityEvent>>,
    high_watermark: usize,
    overflow: Notify,
}

impl EventQueue {
    /// Create a queue that signals an out-of-band flush past `high_watermark`
    pub fn new(high_watermark: usize) -> Self {
        Self {
            buffer: Mutex::new(Vec::new()),
            high_watermark,
            overflow: Notify::new(),
        }
    }

    /// Append an event; fire-and-forget, no acknowledgement
    ///
    /// Returns `true` when the buffer length exceeded the high-watermark and
    /// an immediate flush was signalled, bounding worst-case latency under
    /// load.
    pub fn push(&self, event: ActivityEvent) -> bool {
        let len = {
            let mut buffer = self.buffer.lock().expect("queue lock poisoned");
            buffer.push(event);
            buffer.len()
        };

        if len > self.high_watermark {
            trace!(len, high_watermark = self.high_watermark, "queue over watermark");
            self.overflow.notify_one();
            return true;
        }
        false
    }

    /// Atomically take the current contents and clear the buffer
    ///
    /// Events arriving mid-flush land in the fresh buffer: they are neither
    /// lost nor included in the batch being processed.
    pub fn drain(&self) -> Vec<ActivityEvent> {
        let mut buffer = self.buffer.lock().expect("queue lock poisoned");
        std::mem::take(&mut *buffer)
    }

    /// Current buffer length
    pub fn len(&self) -> usize {
        self.buffer.lock().expect("queue lock poisoned").len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notifier signalled when the high-watermark is exceeded
    pub fn overflow(&self) -> &Notify {
        &self.overflow
    }
}
