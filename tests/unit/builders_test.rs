//! Tests for builder modules

use prometheus_tier_scheduler::builders::EngineBuilder;
use prometheus_tier_scheduler::config::EngineConfig;
use prometheus_tier_scheduler::core::EngineError;

#[test]
fn test_engine_builder_defaults() {
    let builder = EngineBuilder::new(EngineConfig::default());
    assert_eq!(builder.config().daily_capacity_target, 50);
    let engine = builder.build().unwrap();
    assert_eq!(engine.config().cycle_interval_secs, 900);
    assert!(!engine.backfill.is_running());
}

#[test]
fn test_engine_builder_rejects_invalid_config() {
    let cfg = EngineConfig { daily_capacity_target: 0, ..EngineConfig::default() };
    let err = EngineBuilder::new(cfg).build().err().unwrap();
    assert!(matches!(err, EngineError::Config(_)));
    assert_eq!(err.to_string(), "configuration error: daily_capacity_target must be greater than 0");
}
