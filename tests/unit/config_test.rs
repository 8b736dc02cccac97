//! Tests for configuration validation

use prometheus_tier_scheduler::config::{AuthorizationLevel, EngineConfig};
use prometheus_tier_scheduler::core::PriorityClass;
use prometheus_tier_scheduler::util::Cents;

#[test]
fn test_defaults_are_valid() {
    let cfg = EngineConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.daily_capacity_target, 50);
    assert_eq!(cfg.authorization_level, AuthorizationLevel::Supervised);
    assert_eq!(cfg.policy(PriorityClass::C).daily_cap_percent, 50);
    assert_eq!(cfg.policy(PriorityClass::B).min_value, Cents::from_dollars(75_000));
}

#[test]
fn test_default_authorization_admits_only_top_class() {
    let cfg = EngineConfig::default();
    assert!(cfg.authorization_level >= cfg.policy(PriorityClass::A).min_authorization);
    assert!(cfg.authorization_level < cfg.policy(PriorityClass::B).min_authorization);
    assert!(cfg.authorization_level < cfg.policy(PriorityClass::C).min_authorization);
}

#[test]
fn test_zero_target_rejected() {
    let cfg = EngineConfig { daily_capacity_target: 0, ..EngineConfig::default() };
    assert_eq!(cfg.validate().unwrap_err(), "daily_capacity_target must be greater than 0");
}

#[test]
fn test_operating_hours_validation() {
    let mut cfg = EngineConfig::default();
    cfg.operating_hours.start_hour = 20;
    cfg.operating_hours.end_hour = 9;
    assert!(cfg.validate().unwrap_err().starts_with("operating_hours"));
}

#[test]
fn test_class_policy_validation() {
    let mut cfg = EngineConfig::default();
    cfg.classes.get_mut(PriorityClass::C).daily_cap_percent = 0;
    assert_eq!(
        cfg.validate().unwrap_err(),
        "Class C policy invalid: daily_cap_percent must be in 1..=100"
    );

    let mut cfg = EngineConfig::default();
    cfg.classes.get_mut(PriorityClass::A).opt_out_ceiling = 1.5;
    assert!(cfg.validate().unwrap_err().contains("opt_out_ceiling"));
}

#[test]
fn test_lower_class_needs_at_least_the_same_authorization() {
    let mut cfg = EngineConfig::default();
    cfg.classes.get_mut(PriorityClass::C).min_authorization = AuthorizationLevel::Supervised;
    assert_eq!(
        cfg.validate().unwrap_err(),
        "Class C must not require a weaker authorization than Class B"
    );
}

#[test]
fn test_thresholds_must_increase() {
    let mut cfg = EngineConfig::default();
    cfg.classes.get_mut(PriorityClass::B).min_value = Cents::from_dollars(10_000);
    assert!(cfg.validate().unwrap_err().starts_with("min_value must increase"));
}

#[test]
fn test_from_json_partial() {
    let cfg = EngineConfig::from_json_str(r#"{"daily_capacity_target": 12, "authorization_level": "full"}"#).unwrap();
    assert_eq!(cfg.daily_capacity_target, 12);
    assert_eq!(cfg.authorization_level, AuthorizationLevel::Full);
    assert_eq!(cfg.stop_loss_window_days, 7);

    assert!(EngineConfig::from_json_str("{not json").unwrap_err().starts_with("parse error"));
    assert!(EngineConfig::from_json_str(r#"{"daily_capacity_target": 0}"#).is_err());
}

#[test]
fn test_class_keys_serialize_as_letters() {
    let json = serde_json::to_value(EngineConfig::default()).unwrap();
    let classes = json["classes"].as_object().unwrap();
    let keys: Vec<&str> = classes.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["A", "B", "C"]);
    assert_eq!(json["classes"]["C"]["daily_cap_percent"], 50);
}

#[test]
fn test_authorization_level_parsing() {
    assert_eq!(" Elevated ".parse::<AuthorizationLevel>().unwrap(), AuthorizationLevel::Elevated);
    assert!("root".parse::<AuthorizationLevel>().is_err());
    assert!(AuthorizationLevel::Full > AuthorizationLevel::Supervised);
}
