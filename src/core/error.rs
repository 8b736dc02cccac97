//! Error types for classification, admission and capacity operations.

use thiserror::Error;

use crate::core::types::EntityId;

/// Errors produced by engine components.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or incomplete entity; skipped and logged by batch callers.
    #[error("invalid entity {entity_id}: {reason}")]
    Validation {
        /// Offending entity.
        entity_id: EntityId,
        /// What is wrong with it.
        reason: String,
    },
    /// Transient backing-store failure.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    /// Attempt to schedule a lower class while a higher one is unexhausted.
    #[error("policy violation: {0}")]
    PolicyViolation(String),
    /// Lost update on a shared counter.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),
    /// Daily capacity is fully used.
    #[error("capacity exhausted")]
    CapacityExhausted,
    /// Another backfill holds the in-progress flag.
    #[error("backfill already in progress")]
    BackfillInProgress,
    /// Entity id not present in the store.
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Whether retrying the whole cycle may succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::ConcurrencyConflict(_))
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
