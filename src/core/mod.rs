//! Classification, admission control and capacity orchestration.

pub mod admission;
pub mod audit;
pub mod backfill;
pub mod capacity;
pub mod classifier;
pub mod error;
pub mod intent;
pub mod metrics;
pub mod notify;
pub mod orchestrator;
pub mod store;
pub mod types;

pub use admission::{AdmissionContext, AdmissionController, AdmissionRule, RuleChain, RuleOutcome};
pub use audit::{ConditionResult, DecisionLog, InMemoryDecisionLog, PolicyDecision};
pub use backfill::{BackfillJob, BackfillMode, BackfillReport, BatchError};
pub use capacity::{AttemptApplied, CapacityState, CapacityStore, ClassCounters, Reservation, Transition};
pub use classifier::{ClassificationResult, Classifier, ClassifierRules, Confidence, ExpectedValue, Factor, Impact};
pub use error::{AppResult, EngineError};
pub use intent::{classify_reply, ReplyIntent};
pub use metrics::{
    compare_classes, top_line, ClassComparison, ClassMetricsAggregator, ClassMetricsSnapshot, Period, SafetySignals,
    TopLine,
};
pub use notify::{EngineEvent, NotificationSink};
pub use orchestrator::{AttemptRecord, Batch, BatchTicket, CapacityOrchestrator, Recommendation, UtilizationReport};
pub use store::{EntityFilter, EntityStore, OutcomeStore};
pub use types::{
    ContactAttempt, EconomicAttributes, Engagement, Entity, EntityId, EntityStatus, OutcomeEvent, OutcomeKind,
    PriorityClass,
};
