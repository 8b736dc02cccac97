//! Append-only policy decision log.
//!
//! Every admission evaluation is written here with the outcome of every
//! rule, so "why was class C not worked today" can be answered from the log
//! alone. Records are never updated; the current decision for a
//! `(class, day)` key is the latest by `decided_at`.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::EngineError;
use crate::core::types::PriorityClass;

/// Outcome of one admission rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionResult {
    /// Rule name.
    pub rule: String,
    /// Whether the rule passed.
    pub passed: bool,
    /// Measured values and thresholds, in words.
    pub detail: String,
}

/// Audited admission decision for one `(class, day)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// Unique record id.
    pub decision_id: Uuid,
    /// Class evaluated.
    pub class: PriorityClass,
    /// Calendar day evaluated.
    pub day: NaiveDate,
    /// Whether the class may be worked.
    pub approved: bool,
    /// First failing rule's detail, or an approval summary.
    pub reason: String,
    /// Every rule outcome, in chain order.
    pub conditions: Vec<ConditionResult>,
    /// Maximum entities that may be issued under this decision.
    pub max_leads: u32,
    /// End of the decision's day.
    pub expires_at: DateTime<Utc>,
    /// Evaluation time.
    pub decided_at: DateTime<Utc>,
}

impl PolicyDecision {
    /// Whether the decision still applies at `now`.
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Rules that failed.
    pub fn violated(&self) -> impl Iterator<Item = &ConditionResult> {
        self.conditions.iter().filter(|c| !c.passed)
    }
}

/// Append-only decision log.
pub trait DecisionLog: Send + Sync {
    /// Append a decision.
    fn append(&self, decision: PolicyDecision) -> Result<(), EngineError>;

    /// Most recent decision for a key.
    fn latest(&self, class: PriorityClass, day: NaiveDate) -> Result<Option<PolicyDecision>, EngineError>;

    /// All decisions for a key in append order.
    fn history(&self, class: PriorityClass, day: NaiveDate) -> Result<Vec<PolicyDecision>, EngineError>;
}

/// In-memory decision log for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryDecisionLog {
    records: RwLock<HashMap<(PriorityClass, NaiveDate), Vec<PolicyDecision>>>,
}

impl InMemoryDecisionLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records across all keys.
    pub fn len(&self) -> usize {
        self.records.read().values().map(Vec::len).sum()
    }

    /// Whether nothing has been logged.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DecisionLog for InMemoryDecisionLog {
    fn append(&self, decision: PolicyDecision) -> Result<(), EngineError> {
        self.records
            .write()
            .entry((decision.class, decision.day))
            .or_default()
            .push(decision);
        Ok(())
    }

    fn latest(&self, class: PriorityClass, day: NaiveDate) -> Result<Option<PolicyDecision>, EngineError> {
        Ok(self
            .records
            .read()
            .get(&(class, day))
            .and_then(|v| v.iter().max_by_key(|d| d.decided_at).cloned()))
    }

    fn history(&self, class: PriorityClass, day: NaiveDate) -> Result<Vec<PolicyDecision>, EngineError> {
        Ok(self.records.read().get(&(class, day)).cloned().unwrap_or_default())
    }
}
