//! Classifier behavior through the public API.

mod common;

use chrono::NaiveDate;
use prometheus_tier_scheduler::config::EngineConfig;
use prometheus_tier_scheduler::core::{Classifier, Confidence, Entity, EntityStore, PriorityClass};
use prometheus_tier_scheduler::util::money::Cents;

use common::{attrs, attrs_for, Harness};

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
}

#[test]
fn dual_path_entity_is_class_a() {
    let classifier = Classifier::from_config(&EngineConfig::default());
    let result = classifier.classify(&attrs(20_000, 15_000), day()).unwrap();
    assert_eq!(result.class, PriorityClass::A);
    assert_eq!(result.class_name, "Class A");
    assert_eq!(result.expected_value.total, Cents::from_dollars(6_500));
    assert_eq!(result.confidence, Confidence::High);
    assert!(result.reason.contains("both revenue paths qualify"));
}

#[test]
fn single_high_value_path_is_class_b() {
    let classifier = Classifier::from_config(&EngineConfig::default());
    let result = classifier.classify(&attrs(80_000, 0), day()).unwrap();
    assert_eq!(result.class, PriorityClass::B);
    assert_eq!(result.expected_value.total, Cents::from_dollars(20_000));
    assert_eq!(result.days_to_cash, 60);
}

#[test]
fn below_floor_is_not_classified() {
    let classifier = Classifier::from_config(&EngineConfig::default());
    assert!(classifier.classify(&attrs(3_000, 0), day()).is_none());
}

#[test]
fn thresholds_follow_configuration() {
    let mut config = EngineConfig::default();
    config.classes.b.min_value = Cents::from_dollars(50_000);
    let classifier = Classifier::from_config(&config);
    let result = classifier.classify(&attrs(60_000, 0), day()).unwrap();
    assert_eq!(result.class, PriorityClass::B);
    let default = Classifier::from_config(&EngineConfig::default());
    assert_eq!(default.classify(&attrs(60_000, 0), day()).unwrap().class, PriorityClass::C);
}

#[test]
fn factors_are_recorded_in_evaluation_order() {
    let classifier = Classifier::default();
    let result = classifier.classify(&attrs(20_000, 15_000), day()).unwrap();
    let names: Vec<&str> = result.factors.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["primary_amount", "secondary_value", "contactability"]);
}

#[test]
fn classification_does_not_depend_on_other_entities() {
    let classifier = Classifier::default();
    let alone = classifier.classify(&attrs_for(PriorityClass::B, 0), day());
    let population: Vec<_> = (0..50).map(|i| attrs_for(PriorityClass::A, i)).collect();
    for a in &population {
        classifier.classify(a, day());
    }
    assert_eq!(classifier.classify(&attrs_for(PriorityClass::B, 0), day()), alone);
}

#[test]
fn backfill_ranks_by_expected_value_within_class() {
    let entities = vec![
        Entity::new(1, attrs(20_000, 15_000)),
        Entity::new(2, attrs(40_000, 15_000)),
        Entity::new(3, attrs(30_000, 15_000)),
    ];
    let h = Harness::classified(common::config(10), entities);
    let rank = |id| h.entities.get(id).unwrap().unwrap().assignment.unwrap().rank;
    assert_eq!(rank(2), Some(1));
    assert_eq!(rank(3), Some(2));
    assert_eq!(rank(1), Some(3));
}
