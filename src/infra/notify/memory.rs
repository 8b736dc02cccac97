//! Notification sinks that keep events in memory or write them to the log.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::core::error::EngineError;
use crate::core::notify::{EngineEvent, NotificationSink};

/// Bounded in-memory sink; the oldest event is dropped when full.
pub struct InMemoryNotificationSink {
    events: Mutex<VecDeque<EngineEvent>>,
    max_events: usize,
    failing: AtomicBool,
}

impl InMemoryNotificationSink {
    /// Create a sink holding at most `max_events` events.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events.min(1024))),
            max_events: max_events.max(1),
            failing: AtomicBool::new(false),
        }
    }

    /// Snapshot of stored events, oldest first.
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Make every delivery fail until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }
}

impl Default for InMemoryNotificationSink {
    fn default() -> Self {
        Self::new(1_000)
    }
}

impl NotificationSink for InMemoryNotificationSink {
    fn notify(&self, event: &EngineEvent) -> Result<(), EngineError> {
        if self.failing.load(Ordering::Acquire) {
            return Err(EngineError::StoreUnavailable("notification channel down".into()));
        }
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event.clone());
        Ok(())
    }
}

/// Sink that writes events as structured log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn notify(&self, event: &EngineEvent) -> Result<(), EngineError> {
        let payload = serde_json::to_string(event).map_err(|e| EngineError::Config(e.to_string()))?;
        tracing::info!(target: "tier_scheduler::events", %payload, "engine event");
        Ok(())
    }
}
