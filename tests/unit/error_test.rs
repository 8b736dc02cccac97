//! Tests for error types

use prometheus_tier_scheduler::core::EngineError;

#[test]
fn test_store_unavailable_error() {
    let err = EngineError::StoreUnavailable("entity db".to_string());
    assert_eq!(format!("{err}"), "store unavailable: entity db");
    assert!(err.is_transient());
}

#[test]
fn test_concurrency_conflict_is_transient() {
    let err = EngineError::ConcurrencyConflict("version 3 != 4".to_string());
    assert_eq!(format!("{err}"), "concurrency conflict: version 3 != 4");
    assert!(err.is_transient());
}

#[test]
fn test_validation_error() {
    let err = EngineError::Validation { entity_id: 7, reason: "negative primary amount".to_string() };
    assert_eq!(format!("{err}"), "invalid entity 7: negative primary amount");
    assert!(!err.is_transient());
}

#[test]
fn test_terminal_errors() {
    assert_eq!(format!("{}", EngineError::CapacityExhausted), "capacity exhausted");
    assert_eq!(format!("{}", EngineError::BackfillInProgress), "backfill already in progress");
    assert_eq!(format!("{}", EngineError::UnknownEntity(42)), "unknown entity 42");
    assert!(!EngineError::CapacityExhausted.is_transient());
    assert!(!EngineError::PolicyViolation("order".to_string()).is_transient());
}
