//! Notification sink contract for external alerting.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::error::EngineError;
use crate::core::types::{EntityId, PriorityClass};
use crate::util::money::Cents;

/// Structured engine event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A class stopped being worked.
    ClassHalted {
        /// Halted class.
        class: PriorityClass,
        /// Why.
        reason: String,
    },
    /// A class became the active class.
    ClassActivated {
        /// Newly active class.
        class: PriorityClass,
    },
    /// A new top-tier (agreement-worthy) entity was classified.
    TopTierClassified {
        /// Entity.
        entity_id: EntityId,
        /// Its expected value.
        expected_value: Cents,
    },
    /// The day's capacity is fully used.
    CapacityExhausted {
        /// Day.
        day: NaiveDate,
    },
    /// A backfill run finished.
    BackfillCompleted {
        /// Entities processed.
        processed: usize,
        /// Errors recorded.
        errors: usize,
    },
}

/// Receives engine events. Delivery failure is never fatal.
pub trait NotificationSink: Send + Sync {
    /// Deliver an event.
    fn notify(&self, event: &EngineEvent) -> Result<(), EngineError>;
}

/// Deliver an event, logging instead of propagating failures.
pub fn deliver(sink: &dyn NotificationSink, event: &EngineEvent) {
    if let Err(e) = sink.notify(event) {
        tracing::warn!(error = %e, ?event, "notification delivery failed");
    }
}
