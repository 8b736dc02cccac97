//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use prometheus_tier_scheduler::builders::{Engine, EngineBuilder};
use prometheus_tier_scheduler::config::{AuthorizationLevel, EngineConfig};
use prometheus_tier_scheduler::core::{BackfillMode, EconomicAttributes, Entity, EntityId, PriorityClass};
use prometheus_tier_scheduler::infra::{InMemoryEntityStore, InMemoryNotificationSink, InMemoryOutcomeStore};
use prometheus_tier_scheduler::util::money::Cents;

/// 2024-06-03 at `hour:minute` UTC (a Monday, inside default operating hours
/// when 9 <= hour < 20).
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, hour, minute, 0).unwrap()
}

pub fn attrs(primary: i64, secondary: i64) -> EconomicAttributes {
    EconomicAttributes {
        primary_amount: Cents::from_dollars(primary),
        secondary_value: Cents::from_dollars(secondary),
        urgency_deadline: None,
        has_phone: true,
        has_email: true,
        cross_referenced: false,
    }
}

/// Attributes that classify as the given class under default thresholds.
/// `bump` varies the amount so ranks are distinct.
pub fn attrs_for(class: PriorityClass, bump: i64) -> EconomicAttributes {
    match class {
        PriorityClass::A => attrs(20_000 + bump, 15_000),
        PriorityClass::B => attrs(80_000 + bump, 0),
        PriorityClass::C => attrs(6_000 + bump, 0),
    }
}

/// `count` unclassified entities of `class`, ids starting at `first_id`.
pub fn population(class: PriorityClass, first_id: EntityId, count: u64) -> Vec<Entity> {
    (0..count)
        .map(|i| Entity::new(first_id + i, attrs_for(class, i64::try_from(i).unwrap() * 10)))
        .collect()
}

/// Config that admits every class inside 9:00-20:00 UTC.
pub fn config(daily_target: u32) -> EngineConfig {
    EngineConfig {
        daily_capacity_target: daily_target,
        authorization_level: AuthorizationLevel::Full,
        ..EngineConfig::default()
    }
}

/// Engine plus handles on its concrete in-memory backends.
pub struct Harness {
    pub engine: Engine,
    pub entities: Arc<InMemoryEntityStore>,
    pub outcomes: Arc<InMemoryOutcomeStore>,
    pub events: Arc<InMemoryNotificationSink>,
}

impl Harness {
    pub fn new(config: EngineConfig, entities: Vec<Entity>) -> Self {
        Self::with_builder(EngineBuilder::new(config), entities)
    }

    pub fn with_builder(builder: EngineBuilder, entities: Vec<Entity>) -> Self {
        let store = Arc::new(InMemoryEntityStore::with_entities(entities));
        let outcomes = Arc::new(InMemoryOutcomeStore::new());
        let events = Arc::new(InMemoryNotificationSink::default());
        let engine = builder
            .with_entity_store(store.clone())
            .with_outcome_store(outcomes.clone())
            .with_notifier(events.clone())
            .build()
            .unwrap();
        Self { engine, entities: store, outcomes, events }
    }

    /// Harness with `entities` already classified and ranked.
    pub fn classified(config: EngineConfig, entities: Vec<Entity>) -> Self {
        let h = Self::new(config, entities);
        let report = h.engine.backfill.run(BackfillMode::Unclassified, at(8, 0)).unwrap();
        assert!(report.success, "{:?}", report.errors);
        h
    }
}
