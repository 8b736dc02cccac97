//! Hand an issued batch to an external outreach executor.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::capacity::AttemptApplied;
use crate::core::orchestrator::{Batch, BatchTicket, CapacityOrchestrator};
use crate::core::types::EntityId;

/// Result of one contact action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutreachOutcome {
    /// Contact was made.
    Delivered {
        /// When.
        at: DateTime<Utc>,
    },
    /// Contact was not made; the reservation is released.
    Failed(String),
}

/// Performs the actual contact. The engine never contacts anyone itself.
#[async_trait]
pub trait OutreachExecutor: Send + Sync {
    /// Contact the ticket's entity.
    async fn contact(&self, ticket: &BatchTicket) -> OutreachOutcome;
}

/// Totals for one dispatched batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    /// Attempts recorded.
    pub delivered: usize,
    /// Attempts already recorded earlier.
    pub duplicates: usize,
    /// Contacts that failed and were released.
    pub failed: usize,
    /// Engine errors while recording or releasing.
    pub errors: Vec<(EntityId, String)>,
}

/// Contact every ticket in order, recording or releasing each.
pub async fn dispatch_batch(
    orchestrator: &CapacityOrchestrator,
    executor: &dyn OutreachExecutor,
    batch: &Batch,
) -> DispatchSummary {
    let mut summary = DispatchSummary::default();
    for ticket in &batch.tickets {
        let entity_id = ticket.entity.id;
        match executor.contact(ticket).await {
            OutreachOutcome::Delivered { at } => match orchestrator.record_attempt(&ticket.attempt(at)) {
                Ok(record) if record.applied == AttemptApplied::Duplicate => summary.duplicates += 1,
                Ok(_) => summary.delivered += 1,
                Err(e) => {
                    tracing::error!(entity_id, error = %e, "failed to record attempt");
                    summary.errors.push((entity_id, e.to_string()));
                }
            },
            OutreachOutcome::Failed(reason) => {
                tracing::warn!(entity_id, %reason, "contact failed, releasing reservation");
                summary.failed += 1;
                if let Err(e) = orchestrator.release(ticket.ticket_id, ticket.issued_at) {
                    summary.errors.push((entity_id, e.to_string()));
                }
            }
        }
    }
    tracing::info!(
        day = %batch.day,
        delivered = summary.delivered,
        failed = summary.failed,
        errors = summary.errors.len(),
        "batch dispatched"
    );
    summary
}
