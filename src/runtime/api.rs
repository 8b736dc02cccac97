//! API-facing request/response models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::capacity::AttemptApplied;
use crate::core::orchestrator::{Batch, CapacityOrchestrator};
use crate::core::types::{ContactAttempt, EntityId, PriorityClass};
use crate::util::money::Cents;

/// Batch request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Entities wanted.
    pub count: u32,
}

/// One issued entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketView {
    /// Ticket id; send it back as `attempt_id`.
    pub ticket_id: Uuid,
    /// Entity to contact.
    pub entity_id: EntityId,
    /// Class issued under.
    pub class: PriorityClass,
    /// Expected value of the entity.
    pub expected_value: Cents,
    /// Rank within its class, if ranked.
    pub rank: Option<u32>,
}

/// Batch response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    /// Day the batch counts against.
    pub day: NaiveDate,
    /// Issued entities in contact order.
    pub tickets: Vec<TicketView>,
    /// Whether the batch was cut short by contention.
    pub deferred: bool,
    /// Why the batch is short, if it is.
    pub note: Option<String>,
}

impl From<Batch> for BatchResponse {
    fn from(batch: Batch) -> Self {
        Self {
            day: batch.day,
            tickets: batch
                .tickets
                .iter()
                .map(|t| TicketView {
                    ticket_id: t.ticket_id,
                    entity_id: t.entity.id,
                    class: t.class,
                    expected_value: t.entity.expected_value(),
                    rank: t.entity.assignment.as_ref().and_then(|a| a.rank),
                })
                .collect(),
            deferred: batch.deferred,
            note: batch.note,
        }
    }
}

/// Attempt report from the outreach executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptReport {
    /// Ticket id of the issued entity.
    pub attempt_id: Uuid,
    /// Entity contacted.
    pub entity_id: EntityId,
    /// Class issued under.
    pub class: PriorityClass,
    /// When contact was made.
    pub at: DateTime<Utc>,
}

/// Attempt acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptAck {
    /// False when the attempt had already been recorded.
    pub counted: bool,
    /// Attempts used today.
    pub used: u32,
    /// Capacity left today.
    pub remaining: u32,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Kill switch state.
    pub engine_enabled: bool,
    /// Current day.
    pub day: NaiveDate,
    /// State-machine label.
    pub state: String,
    /// Attempts used today.
    pub used: u32,
    /// Daily target.
    pub target: u32,
    /// Store error, when unhealthy.
    pub error: Option<String>,
}

/// Issue a batch.
pub fn next_batch(
    orchestrator: &CapacityOrchestrator,
    req: &BatchRequest,
    now: DateTime<Utc>,
) -> Result<BatchResponse, String> {
    orchestrator
        .get_next_batch(req.count, now)
        .map(BatchResponse::from)
        .map_err(|e| e.to_string())
}

/// Record an attempt.
pub fn report_attempt(orchestrator: &CapacityOrchestrator, report: &AttemptReport) -> Result<AttemptAck, String> {
    let attempt = ContactAttempt {
        attempt_id: report.attempt_id,
        entity_id: report.entity_id,
        class: report.class,
        at: report.at,
    };
    let record = orchestrator.record_attempt(&attempt).map_err(|e| e.to_string())?;
    Ok(AttemptAck {
        counted: record.applied != AttemptApplied::Duplicate,
        used: record.used,
        remaining: record.remaining,
    })
}

/// Return a health payload.
pub fn health(orchestrator: &CapacityOrchestrator, now: DateTime<Utc>) -> Health {
    let engine_enabled = orchestrator.config().engine_enabled;
    match orchestrator.state(now) {
        Ok(state) => Health {
            ok: true,
            engine_enabled,
            day: state.day,
            state: state.state_name(),
            used: state.used,
            target: state.daily_target,
            error: None,
        },
        Err(e) => Health {
            ok: false,
            engine_enabled,
            day: orchestrator.day_of(now),
            state: String::new(),
            used: 0,
            target: orchestrator.config().daily_capacity_target,
            error: Some(e.to_string()),
        },
    }
}
