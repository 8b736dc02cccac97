//! Assemble an [`Engine`] from configuration and pluggable backends.
//!
//! Any backend not supplied falls back to its in-memory implementation.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::core::admission::{AdmissionController, RuleChain};
use crate::core::audit::{DecisionLog, InMemoryDecisionLog};
use crate::core::backfill::BackfillJob;
use crate::core::capacity::CapacityStore;
use crate::core::classifier::Classifier;
use crate::core::error::EngineError;
use crate::core::metrics::ClassMetricsAggregator;
use crate::core::notify::NotificationSink;
use crate::core::orchestrator::CapacityOrchestrator;
use crate::core::store::{EntityStore, OutcomeStore};
use crate::infra::{InMemoryCapacityStore, InMemoryEntityStore, InMemoryOutcomeStore, TracingNotificationSink};

/// Wired engine components sharing one set of backends.
#[derive(Clone)]
pub struct Engine {
    /// Batch issuance, attempt recording and reconciliation.
    pub orchestrator: CapacityOrchestrator,
    /// Population (re)classification.
    pub backfill: Arc<BackfillJob>,
    /// Classifier built from the configuration.
    pub classifier: Classifier,
    /// Entity store.
    pub entities: Arc<dyn EntityStore>,
    /// Outcome store.
    pub outcomes: Arc<dyn OutcomeStore>,
    /// Policy decision log.
    pub decisions: Arc<dyn DecisionLog>,
}

impl Engine {
    /// Metrics over the engine's stores.
    pub const fn metrics(&self) -> &ClassMetricsAggregator {
        self.orchestrator.metrics()
    }

    /// Configuration in effect.
    pub const fn config(&self) -> &EngineConfig {
        self.orchestrator.config()
    }
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    entities: Option<Arc<dyn EntityStore>>,
    outcomes: Option<Arc<dyn OutcomeStore>>,
    capacity: Option<Arc<dyn CapacityStore>>,
    decisions: Option<Arc<dyn DecisionLog>>,
    notifier: Option<Arc<dyn NotificationSink>>,
    chain: RuleChain,
}

impl EngineBuilder {
    /// Start from a configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            entities: None,
            outcomes: None,
            capacity: None,
            decisions: None,
            notifier: None,
            chain: RuleChain::default(),
        }
    }

    /// Configuration being built.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Use this entity store.
    #[must_use]
    pub fn with_entity_store(mut self, store: Arc<dyn EntityStore>) -> Self {
        self.entities = Some(store);
        self
    }

    /// Use this outcome store.
    #[must_use]
    pub fn with_outcome_store(mut self, store: Arc<dyn OutcomeStore>) -> Self {
        self.outcomes = Some(store);
        self
    }

    /// Use this capacity store.
    #[must_use]
    pub fn with_capacity_store(mut self, store: Arc<dyn CapacityStore>) -> Self {
        self.capacity = Some(store);
        self
    }

    /// Use this decision log.
    #[must_use]
    pub fn with_decision_log(mut self, log: Arc<dyn DecisionLog>) -> Self {
        self.decisions = Some(log);
        self
    }

    /// Use this notification sink.
    #[must_use]
    pub fn with_notifier(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(sink);
        self
    }

    /// Use a custom admission rule order.
    #[must_use]
    pub fn with_rule_chain(mut self, chain: RuleChain) -> Self {
        self.chain = chain;
        self
    }

    /// Validate the configuration and wire the engine.
    pub fn build(self) -> Result<Engine, EngineError> {
        self.config.validate().map_err(EngineError::Config)?;

        let entities: Arc<dyn EntityStore> = self.entities.unwrap_or_else(|| Arc::new(InMemoryEntityStore::new()));
        let outcomes: Arc<dyn OutcomeStore> =
            self.outcomes.unwrap_or_else(|| Arc::new(InMemoryOutcomeStore::new()));
        let capacity: Arc<dyn CapacityStore> =
            self.capacity.unwrap_or_else(|| Arc::new(InMemoryCapacityStore::new()));
        let decisions: Arc<dyn DecisionLog> =
            self.decisions.unwrap_or_else(|| Arc::new(InMemoryDecisionLog::new()));
        let notifier: Arc<dyn NotificationSink> =
            self.notifier.unwrap_or_else(|| Arc::new(TracingNotificationSink));

        let classifier = Classifier::from_config(&self.config);
        let backfill = Arc::new(BackfillJob::new(
            classifier.clone(),
            Arc::clone(&entities),
            Arc::clone(&notifier),
            self.config.backfill.clone(),
            self.config.operating_hours.utc_offset_minutes,
        ));
        let admission = AdmissionController::with_chain(self.chain, Arc::clone(&decisions));
        let orchestrator = CapacityOrchestrator::new(
            self.config,
            Arc::clone(&entities),
            Arc::clone(&outcomes),
            capacity,
            admission,
            notifier,
        );
        tracing::debug!(
            daily_target = orchestrator.config().daily_capacity_target,
            level = ?orchestrator.config().authorization_level,
            "engine built"
        );
        Ok(Engine {
            orchestrator,
            backfill,
            classifier,
            entities,
            outcomes,
            decisions,
        })
    }
}
